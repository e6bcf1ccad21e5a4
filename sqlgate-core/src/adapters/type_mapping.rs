//! Backend-neutral value model and its JSON serialization.
//!
//! Dialect executors decode each cell into a [`NativeValue`]; a
//! [`TypeMapper`](super::TypeMapper) then turns it into one of the JSON
//! value kinds a result may carry (string, number, bool, null, plus arrays
//! and documents passed through from JSON-typed columns).

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Number, Value as JsonValue};

/// A decoded cell before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(uuid::Uuid),
    Json(JsonValue),
    Array(Vec<NativeValue>),
}

/// Serializes a decoded cell.
///
/// - timestamps, dates and times become ISO-8601 strings
/// - decimals become floating point numbers
/// - binary values are decoded as UTF-8 with replacement characters
/// - NaN and infinities, which JSON cannot carry, become null
///
/// # Example
/// ```rust
/// use sqlgate_core::adapters::{NativeValue, serialize_value};
/// use serde_json::json;
///
/// assert_eq!(serialize_value(NativeValue::Bytes(b"ab\xffc".to_vec())), json!("ab\u{fffd}c"));
/// assert_eq!(serialize_value(NativeValue::Float(f64::NAN)), json!(null));
/// ```
pub fn serialize_value(value: NativeValue) -> JsonValue {
    match value {
        NativeValue::Null => JsonValue::Null,
        NativeValue::Bool(b) => JsonValue::Bool(b),
        NativeValue::Int(i) => JsonValue::from(i),
        NativeValue::UInt(u) => JsonValue::from(u),
        NativeValue::Float(f) => float(f),
        NativeValue::Decimal(d) => d.to_f64().map_or(JsonValue::Null, float),
        NativeValue::Text(s) => JsonValue::String(s),
        NativeValue::Bytes(bytes) => JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()),
        NativeValue::Timestamp(ts) => JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        NativeValue::TimestampTz(ts) => JsonValue::String(ts.to_rfc3339()),
        NativeValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        NativeValue::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
        NativeValue::Uuid(u) => JsonValue::String(u.to_string()),
        NativeValue::Json(v) => v,
        NativeValue::Array(items) => JsonValue::Array(items.into_iter().map(serialize_value).collect()),
    }
}

fn float(f: f64) -> JsonValue {
    Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(serialize_value(NativeValue::Null), JsonValue::Null);
        assert_eq!(serialize_value(NativeValue::Bool(true)), json!(true));
        assert_eq!(serialize_value(NativeValue::Int(-7)), json!(-7));
        assert_eq!(serialize_value(NativeValue::UInt(u64::MAX)), json!(u64::MAX));
        assert_eq!(serialize_value(NativeValue::Float(1.5)), json!(1.5));
        assert_eq!(serialize_value(NativeValue::Text("hi".into())), json!("hi"));
    }

    #[test]
    fn test_decimal_becomes_float() {
        let value = NativeValue::Decimal(BigDecimal::from_str("12.50").unwrap());
        assert_eq!(serialize_value(value), json!(12.5));
    }

    #[test]
    fn test_temporal_values_are_iso_8601() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let time = NaiveTime::from_hms_micro_opt(14, 5, 6, 250_000).unwrap();
        let naive = date.and_hms_opt(1, 2, 3).unwrap();

        assert_eq!(
            serialize_value(NativeValue::Timestamp(naive)),
            json!("2024-03-09T01:02:03")
        );
        assert_eq!(
            serialize_value(NativeValue::Timestamp(date.and_time(time))),
            json!("2024-03-09T14:05:06.250")
        );
        assert_eq!(
            serialize_value(NativeValue::TimestampTz(naive.and_utc())),
            json!("2024-03-09T01:02:03+00:00")
        );
        assert_eq!(serialize_value(NativeValue::Date(date)), json!("2024-03-09"));
        assert_eq!(serialize_value(NativeValue::Time(time)), json!("14:05:06.250"));
    }

    #[test]
    fn test_bytes_are_lossy_utf8() {
        assert_eq!(
            serialize_value(NativeValue::Bytes(vec![0x68, 0x69])),
            json!("hi")
        );
        assert_eq!(
            serialize_value(NativeValue::Bytes(vec![0xff, 0x41])),
            json!("\u{fffd}A")
        );
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(serialize_value(NativeValue::Float(f64::INFINITY)), JsonValue::Null);
        assert_eq!(serialize_value(NativeValue::Float(f64::NAN)), JsonValue::Null);
    }

    #[test]
    fn test_arrays_and_documents() {
        let value = NativeValue::Array(vec![
            NativeValue::Int(1),
            NativeValue::Null,
            NativeValue::Uuid(uuid::Uuid::nil()),
        ]);
        assert_eq!(
            serialize_value(value),
            json!([1, null, "00000000-0000-0000-0000-000000000000"])
        );
        assert_eq!(
            serialize_value(NativeValue::Json(json!({"a": [1, 2]}))),
            json!({"a": [1, 2]})
        );
    }
}
