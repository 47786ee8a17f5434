//! Conversion between JSON values and MySQL values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::{Column, Value};
use serde_json::{Number, Value as Json};
use sqlgate_protocol::Argument;

/// MySQL collation id of the `binary` character set.
const BINARY_CHARSET: u16 = 63;

/// Column facts that decide how a value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub column_type: ColumnType,
    pub unsigned: bool,
    pub binary: bool,
}

impl ColumnInfo {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            unsigned: false,
            binary: false,
        }
    }
}

impl From<&Column> for ColumnInfo {
    fn from(column: &Column) -> Self {
        Self {
            column_type: column.column_type(),
            unsigned: column.flags().contains(ColumnFlags::UNSIGNED_FLAG),
            binary: column.character_set() == BINARY_CHARSET,
        }
    }
}

/// Bind a request argument.
pub fn to_mysql(argument: Argument) -> Value {
    match argument {
        Argument::Bytes(bytes) => Value::Bytes(bytes),
        Argument::Value(json) => json_to_mysql(json),
    }
}

fn json_to_mysql(json: Json) -> Value {
    match json {
        Json::Null => Value::NULL,
        Json::Bool(b) => Value::Int(i64::from(b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => Value::Bytes(s.into_bytes()),
        nested @ (Json::Array(_) | Json::Object(_)) => {
            Value::Bytes(nested.to_string().into_bytes())
        }
    }
}

/// Render a result cell.
pub fn from_mysql(value: &Value, column: ColumnInfo) -> Json {
    match value {
        Value::NULL => Json::Null,
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => float(f64::from(*f)),
        Value::Double(d) => float(*d),
        Value::Bytes(bytes) => bytes_to_json(bytes, column),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if column.column_type == ColumnType::MYSQL_TYPE_DATE {
                Json::String(format!("{:04}-{:02}-{:02}", year, month, day))
            } else {
                Json::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                    fraction(*micros)
                ))
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            Json::String(format!(
                "{}{:02}:{:02}:{:02}{}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds,
                fraction(*micros)
            ))
        }
    }
}

fn bytes_to_json(bytes: &[u8], column: ColumnInfo) -> Json {
    use ColumnType::*;

    let text = std::str::from_utf8(bytes).ok();
    match column.column_type {
        MYSQL_TYPE_JSON => match serde_json::from_slice(bytes) {
            Ok(json) => json,
            Err(_) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
        },
        MYSQL_TYPE_TINY
        | MYSQL_TYPE_SHORT
        | MYSQL_TYPE_INT24
        | MYSQL_TYPE_LONG
        | MYSQL_TYPE_LONGLONG
        | MYSQL_TYPE_YEAR => {
            let parsed = text.and_then(|t| {
                if column.unsigned {
                    t.parse::<u64>().ok().map(Json::from)
                } else {
                    t.parse::<i64>().ok().map(Json::from)
                }
            });
            parsed.unwrap_or_else(|| lossy(bytes))
        }
        MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => text
            .and_then(|t| t.parse::<f64>().ok())
            .map(float)
            .unwrap_or_else(|| lossy(bytes)),
        MYSQL_TYPE_BIT => Json::String(STANDARD.encode(bytes)),
        MYSQL_TYPE_TINY_BLOB
        | MYSQL_TYPE_MEDIUM_BLOB
        | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB
        | MYSQL_TYPE_STRING
        | MYSQL_TYPE_VAR_STRING
        | MYSQL_TYPE_VARCHAR
            if column.binary =>
        {
            Json::String(STANDARD.encode(bytes))
        }
        // DECIMAL stays text to keep its precision.
        _ => lossy(bytes),
    }
}

fn lossy(bytes: &[u8]) -> Json {
    Json::String(String::from_utf8_lossy(bytes).into_owned())
}

fn float(value: f64) -> Json {
    Number::from_f64(value).map(Json::Number).unwrap_or(Json::Null)
}

fn fraction(micros: u32) -> String {
    if micros == 0 {
        String::new()
    } else {
        format!(".{:06}", micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arguments() {
        assert_eq!(to_mysql(Argument::Value(json!(null))), Value::NULL);
        assert_eq!(to_mysql(Argument::Value(json!(true))), Value::Int(1));
        assert_eq!(to_mysql(Argument::Value(json!(-5))), Value::Int(-5));
        assert_eq!(
            to_mysql(Argument::Value(json!(u64::MAX))),
            Value::UInt(u64::MAX)
        );
        assert_eq!(to_mysql(Argument::Value(json!(1.5))), Value::Double(1.5));
        assert_eq!(
            to_mysql(Argument::Value(json!("abc"))),
            Value::Bytes(b"abc".to_vec())
        );
        assert_eq!(
            to_mysql(Argument::Value(json!({"a": 1}))),
            Value::Bytes(br#"{"a":1}"#.to_vec())
        );
        assert_eq!(to_mysql(Argument::Bytes(vec![0, 1])), Value::Bytes(vec![0, 1]));
    }

    #[test]
    fn test_binary_protocol_values() {
        let long = ColumnInfo::new(ColumnType::MYSQL_TYPE_LONG);
        assert_eq!(from_mysql(&Value::NULL, long), Json::Null);
        assert_eq!(from_mysql(&Value::Int(-3), long), json!(-3));
        assert_eq!(from_mysql(&Value::UInt(3), long), json!(3));
        let double = ColumnInfo::new(ColumnType::MYSQL_TYPE_DOUBLE);
        assert_eq!(from_mysql(&Value::Double(2.5), double), json!(2.5));
    }

    #[test]
    fn test_text_values_by_column_type() {
        let unsigned = ColumnInfo {
            unsigned: true,
            ..ColumnInfo::new(ColumnType::MYSQL_TYPE_LONGLONG)
        };
        assert_eq!(
            from_mysql(&Value::Bytes(b"18446744073709551615".to_vec()), unsigned),
            json!(u64::MAX)
        );
        assert_eq!(
            from_mysql(
                &Value::Bytes(b"12.50".to_vec()),
                ColumnInfo::new(ColumnType::MYSQL_TYPE_NEWDECIMAL)
            ),
            json!("12.50")
        );
        assert_eq!(
            from_mysql(
                &Value::Bytes(br#"{"k":[1,2]}"#.to_vec()),
                ColumnInfo::new(ColumnType::MYSQL_TYPE_JSON)
            ),
            json!({"k": [1, 2]})
        );
        assert_eq!(
            from_mysql(
                &Value::Bytes(b"name".to_vec()),
                ColumnInfo::new(ColumnType::MYSQL_TYPE_VAR_STRING)
            ),
            json!("name")
        );
    }

    #[test]
    fn test_binary_columns_are_base64() {
        let blob = ColumnInfo {
            binary: true,
            ..ColumnInfo::new(ColumnType::MYSQL_TYPE_BLOB)
        };
        assert_eq!(from_mysql(&Value::Bytes(vec![0, 1]), blob), json!("AAE="));

        let text = ColumnInfo::new(ColumnType::MYSQL_TYPE_BLOB);
        assert_eq!(from_mysql(&Value::Bytes(b"hi".to_vec()), text), json!("hi"));
    }

    #[test]
    fn test_dates_and_times() {
        let date = ColumnInfo::new(ColumnType::MYSQL_TYPE_DATE);
        assert_eq!(
            from_mysql(&Value::Date(2024, 2, 29, 0, 0, 0, 0), date),
            json!("2024-02-29")
        );

        let datetime = ColumnInfo::new(ColumnType::MYSQL_TYPE_DATETIME);
        assert_eq!(
            from_mysql(&Value::Date(2024, 2, 29, 13, 5, 9, 120), datetime),
            json!("2024-02-29 13:05:09.000120")
        );

        let time = ColumnInfo::new(ColumnType::MYSQL_TYPE_TIME);
        assert_eq!(
            from_mysql(&Value::Time(true, 1, 2, 3, 4, 0), time),
            json!("-26:03:04")
        );
    }
}
