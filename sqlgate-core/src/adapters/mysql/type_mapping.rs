//! MySQL cell decoding and column type names.

use crate::adapters::{NativeValue, TypeMapper};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

pub(crate) fn decode_row(row: &MySqlRow) -> Result<Vec<NativeValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|index| decode_value(row, index))
        .collect()
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Result<Option<T>, sqlx::Error>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index)
}

/// Decodes one cell according to the type name the server reported.
///
/// Integer types are widened to 64 bits, keeping signedness. `TIME` values
/// outside a single day, which MySQL allows, fall back to raw bytes.
pub(crate) fn decode_value(row: &MySqlRow, index: usize) -> Result<NativeValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(NativeValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => get::<bool>(row, index)?.map(NativeValue::Bool),
        "TINYINT" => get::<i8>(row, index)?.map(|v| NativeValue::Int(i64::from(v))),
        "SMALLINT" => get::<i16>(row, index)?.map(|v| NativeValue::Int(i64::from(v))),
        "MEDIUMINT" | "INT" => get::<i32>(row, index)?.map(|v| NativeValue::Int(i64::from(v))),
        "BIGINT" => get::<i64>(row, index)?.map(NativeValue::Int),
        "TINYINT UNSIGNED" => get::<u8>(row, index)?.map(|v| NativeValue::UInt(u64::from(v))),
        "SMALLINT UNSIGNED" => get::<u16>(row, index)?.map(|v| NativeValue::UInt(u64::from(v))),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            get::<u32>(row, index)?.map(|v| NativeValue::UInt(u64::from(v)))
        }
        "BIGINT UNSIGNED" => get::<u64>(row, index)?.map(NativeValue::UInt),
        "YEAR" => row
            .try_get_unchecked::<Option<u16>, _>(index)?
            .map(|v| NativeValue::UInt(u64::from(v))),
        "FLOAT" => get::<f32>(row, index)?.map(|v| NativeValue::Float(f64::from(v))),
        "DOUBLE" => get::<f64>(row, index)?.map(NativeValue::Float),
        "DECIMAL" => get::<BigDecimal>(row, index)?.map(NativeValue::Decimal),
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get_unchecked::<Option<String>, _>(index)?
                .map(NativeValue::Text)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => get::<Vec<u8>>(row, index)?.map(NativeValue::Bytes),
        "DATE" => get::<NaiveDate>(row, index)?.map(NativeValue::Date),
        "DATETIME" => get::<NaiveDateTime>(row, index)?.map(NativeValue::Timestamp),
        "TIMESTAMP" => get::<DateTime<Utc>>(row, index)?.map(NativeValue::TimestampTz),
        "TIME" => match get::<NaiveTime>(row, index) {
            Ok(value) => value.map(NativeValue::Time),
            Err(_) => row
                .try_get_unchecked::<Option<Vec<u8>>, _>(index)?
                .map(NativeValue::Bytes),
        },
        "JSON" => get::<JsonValue>(row, index)?.map(NativeValue::Json),
        _ => {
            tracing::debug!(type_name, "No dedicated decoder for MySQL type; reading bytes");
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index)?
                .map(NativeValue::Bytes)
        }
    };
    Ok(value.unwrap_or(NativeValue::Null))
}

/// Column type names for MySQL results.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTypeMapper;

impl TypeMapper for MySqlTypeMapper {
    fn column_type(&self, backend_type: &str) -> String {
        match backend_type {
            "BOOLEAN" => "tinyint(1)".to_string(),
            other => other.to_lowercase(),
        }
    }
}
