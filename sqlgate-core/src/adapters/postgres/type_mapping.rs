//! PostgreSQL cell decoding and column type names.

use crate::adapters::{NativeValue, TypeMapper};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Decodes every cell of `row` in column order.
pub(crate) fn decode_row(row: &PgRow) -> Result<Vec<NativeValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|index| decode_value(row, index))
        .collect()
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

fn array<'r, T>(
    row: &'r PgRow,
    index: usize,
    wrap: impl Fn(T) -> NativeValue,
) -> Result<NativeValue, sqlx::Error>
where
    Vec<Option<T>>: Decode<'r, Postgres> + Type<Postgres>,
{
    Ok(get::<Vec<Option<T>>>(row, index)?.map_or(NativeValue::Null, |items| {
        NativeValue::Array(
            items
                .into_iter()
                .map(|item| item.map_or(NativeValue::Null, &wrap))
                .collect(),
        )
    }))
}

/// Decodes one cell according to its wire type.
///
/// Types without a dedicated arm (enums, domains, intervals, network
/// types and so on) fall back to their text form when it is valid UTF-8 and
/// to raw bytes otherwise.
pub(crate) fn decode_value(row: &PgRow, index: usize) -> Result<NativeValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(NativeValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => get::<bool>(row, index)?.map(NativeValue::Bool),
        "INT2" => get::<i16>(row, index)?.map(|v| NativeValue::Int(i64::from(v))),
        "INT4" => get::<i32>(row, index)?.map(|v| NativeValue::Int(i64::from(v))),
        "INT8" => get::<i64>(row, index)?.map(NativeValue::Int),
        "FLOAT4" => get::<f32>(row, index)?.map(|v| NativeValue::Float(f64::from(v))),
        "FLOAT8" => get::<f64>(row, index)?.map(NativeValue::Float),
        "NUMERIC" => get::<BigDecimal>(row, index)?.map(NativeValue::Decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "CITEXT" | "UNKNOWN" => {
            get::<String>(row, index)?.map(NativeValue::Text)
        }
        "TIMESTAMP" => get::<NaiveDateTime>(row, index)?.map(NativeValue::Timestamp),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index)?.map(NativeValue::TimestampTz),
        "DATE" => get::<NaiveDate>(row, index)?.map(NativeValue::Date),
        "TIME" => get::<NaiveTime>(row, index)?.map(NativeValue::Time),
        "UUID" => get::<uuid::Uuid>(row, index)?.map(NativeValue::Uuid),
        "JSON" | "JSONB" => get::<JsonValue>(row, index)?.map(NativeValue::Json),
        "BYTEA" => get::<Vec<u8>>(row, index)?.map(NativeValue::Bytes),
        "BOOL[]" => return array::<bool>(row, index, NativeValue::Bool),
        "INT2[]" => return array::<i16>(row, index, |v| NativeValue::Int(i64::from(v))),
        "INT4[]" => return array::<i32>(row, index, |v| NativeValue::Int(i64::from(v))),
        "INT8[]" => return array::<i64>(row, index, NativeValue::Int),
        "FLOAT4[]" => return array::<f32>(row, index, |v| NativeValue::Float(f64::from(v))),
        "FLOAT8[]" => return array::<f64>(row, index, NativeValue::Float),
        "NUMERIC[]" => return array::<BigDecimal>(row, index, NativeValue::Decimal),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            return array::<String>(row, index, NativeValue::Text);
        }
        "UUID[]" => return array::<uuid::Uuid>(row, index, NativeValue::Uuid),
        "TIMESTAMPTZ[]" => {
            return array::<DateTime<Utc>>(row, index, NativeValue::TimestampTz);
        }
        _ => return Ok(decode_fallback(row, index, &type_name)),
    };
    Ok(value.unwrap_or(NativeValue::Null))
}

fn decode_fallback(row: &PgRow, index: usize, type_name: &str) -> NativeValue {
    if let Ok(Some(text)) = row.try_get_unchecked::<Option<String>, _>(index) {
        return NativeValue::Text(text);
    }
    match row.try_get_unchecked::<Option<Vec<u8>>, _>(index) {
        Ok(Some(bytes)) => NativeValue::Bytes(bytes),
        Ok(None) => NativeValue::Null,
        Err(e) => {
            tracing::debug!(type_name, error = %e, "Undecodable PostgreSQL value; returning null");
            NativeValue::Null
        }
    }
}

/// Column type names for PostgreSQL results.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn column_type(&self, backend_type: &str) -> String {
        let (base, is_array) = match backend_type.strip_suffix("[]") {
            Some(base) => (base, true),
            None => (backend_type, false),
        };
        let name = match base.to_ascii_uppercase().as_str() {
            "BOOL" => "boolean".to_string(),
            "INT2" => "smallint".to_string(),
            "INT4" => "integer".to_string(),
            "INT8" => "bigint".to_string(),
            "FLOAT4" => "real".to_string(),
            "FLOAT8" => "double precision".to_string(),
            "NUMERIC" => "numeric".to_string(),
            "VARCHAR" => "character varying".to_string(),
            "BPCHAR" => "character".to_string(),
            "TIMESTAMP" => "timestamp without time zone".to_string(),
            "TIMESTAMPTZ" => "timestamp with time zone".to_string(),
            "TIME" => "time without time zone".to_string(),
            "TIMETZ" => "time with time zone".to_string(),
            _ => base.to_lowercase(),
        };
        if is_array { format!("{}[]", name) } else { name }
    }
}
