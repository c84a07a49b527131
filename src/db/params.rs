//! Query parameters and their per-database binding.
//!
//! [`QueryParam`] is the positional parameter type accepted by every
//! executor and CRUD call. Entity columns are converted from their serialized
//! JSON form, using the entity's [`ColumnType`] hints for values whose JSON
//! form does not carry their SQL type. The bind helpers attach values to
//! database-specific queries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};
use std::str::FromStr;
use uuid::Uuid;

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Uuid(Uuid),
    /// Date and time without a zone
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// SQL type of an entity column whose serialized form is ambiguous.
///
/// `serde` writes dates, decimals and UUIDs as JSON strings and byte vectors
/// as arrays of numbers. Without a hint those would be bound as text or
/// JSON, which typed columns reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    Bytes,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a serialized column value into a parameter of `column_type`.
    pub fn typed(value: &JsonValue, column_type: ColumnType) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::Null);
        }
        match column_type {
            ColumnType::Json => Ok(Self::Json(value.clone())),
            ColumnType::Bytes => bytes_from_json(value).map(Self::Bytes),
            ColumnType::Decimal => decimal_from_json(value).map(Self::Decimal),
            ColumnType::Uuid => {
                let text = expect_str(value, "a UUID")?;
                Uuid::parse_str(text)
                    .map(Self::Uuid)
                    .map_err(|e| format!("invalid UUID '{text}': {e}"))
            }
            ColumnType::Timestamp => {
                let text = expect_str(value, "a timestamp")?;
                parse_timestamp(text)
                    .map(Self::Timestamp)
                    .ok_or_else(|| format!("invalid timestamp '{text}'"))
            }
            ColumnType::TimestampTz => {
                let text = expect_str(value, "a timestamp")?;
                DateTime::parse_from_rfc3339(text)
                    .map(|v| v.with_timezone(&Utc))
                    .ok()
                    .or_else(|| parse_timestamp(text).map(|v| v.and_utc()))
                    .map(Self::TimestampTz)
                    .ok_or_else(|| format!("invalid timestamp '{text}'"))
            }
            ColumnType::Date => {
                let text = expect_str(value, "a date")?;
                NaiveDate::from_str(text)
                    .map(Self::Date)
                    .map_err(|e| format!("invalid date '{text}': {e}"))
            }
            ColumnType::Time => {
                let text = expect_str(value, "a time")?;
                NaiveTime::from_str(text)
                    .map(Self::Time)
                    .map_err(|e| format!("invalid time '{text}': {e}"))
            }
        }
    }

    /// Text form for drivers without a native type for this value.
    fn to_text(&self) -> Option<String> {
        match self {
            Self::Decimal(v) => Some(v.to_string()),
            Self::Uuid(v) => Some(v.hyphenated().to_string()),
            Self::Timestamp(v) => Some(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::TimestampTz(v) => Some(v.to_rfc3339()),
            Self::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            Self::Time(v) => Some(v.format("%H:%M:%S%.f").to_string()),
            Self::Json(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

fn expect_str<'a>(value: &'a JsonValue, expected: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected {expected} string, found {value}"))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::from_str(text)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|v| v.naive_utc()))
}

fn decimal_from_json(value: &JsonValue) -> Result<Decimal, String> {
    match value {
        JsonValue::String(text) => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map_err(|e| format!("invalid decimal '{text}': {e}")),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => Ok(Decimal::from(v)),
            None => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map_err(|e| format!("invalid decimal {n}: {e}")),
        },
        other => Err(format!("expected a decimal, found {other}")),
    }
}

fn bytes_from_json(value: &JsonValue) -> Result<Vec<u8>, String> {
    let JsonValue::Array(items) = value else {
        return Err(format!("expected an array of bytes, found {value}"));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| format!("expected a byte, found {item}"))
        })
        .collect()
}

impl From<&JsonValue> for QueryParam {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(*v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(v) => Self::String(v.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

impl From<JsonValue> for QueryParam {
    fn from(value: JsonValue) -> Self {
        Self::from(&value)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Decimal> for QueryParam {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Uuid> for QueryParam {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<NaiveDateTime> for QueryParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::TimestampTz(v)
    }
}

impl From<NaiveDate> for QueryParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for QueryParam {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Bind a parameter to a MySQL query.
///
/// UUIDs go in as hyphenated text so they match `CHAR(36)` columns.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::Decimal(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Uuid(v) => query.bind(v.hyphenated().to_string()),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::Decimal(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
        QueryParam::Uuid(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
    }
}

/// Bind a parameter to a SQLite query.
///
/// SQLite has no decimal, UUID, date or JSON storage class, so those are
/// stored as text in the form `serde` reads back.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        other => query.bind(other.to_text()),
    }
}

/// Bind a parameter to a SQL Server query.
pub(crate) fn bind_mssql_param<'q>(query: &mut tiberius::Query<'q>, param: &'q QueryParam) {
    match param {
        QueryParam::Null => query.bind(Option::<&str>::None),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::Decimal(v) => query.bind(tiberius::numeric::Numeric::new_with_scale(
            v.mantissa(),
            v.scale() as u8,
        )),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(v.to_string()),
        QueryParam::Uuid(v) => query.bind(*v),
        QueryParam::Timestamp(v) => query.bind(*v),
        QueryParam::TimestampTz(v) => query.bind(*v),
        QueryParam::Date(v) => query.bind(*v),
        QueryParam::Time(v) => query.bind(*v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_value() {
        assert_eq!(QueryParam::from(&json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from(&json!(true)), QueryParam::Bool(true));
        assert_eq!(QueryParam::from(&json!(42)), QueryParam::Int(42));
        assert_eq!(QueryParam::from(&json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(
            QueryParam::from(&json!("red")),
            QueryParam::String("red".into())
        );
        assert_eq!(
            QueryParam::from(&json!([1, 2])),
            QueryParam::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_from_option() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("L")), QueryParam::String("L".into()));
    }

    #[test]
    fn test_typed_keeps_decimal_precision() {
        let param = QueryParam::typed(&json!("1234567890123456789.01"), ColumnType::Decimal).unwrap();
        assert_eq!(
            param,
            QueryParam::Decimal(Decimal::from_str("1234567890123456789.01").unwrap())
        );
        let param = QueryParam::typed(&json!(12), ColumnType::Decimal).unwrap();
        assert_eq!(param, QueryParam::Decimal(Decimal::from(12)));
    }

    #[test]
    fn test_typed_dates_and_uuid() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let serialized = serde_json::to_value(start).unwrap();
        assert_eq!(
            QueryParam::typed(&serialized, ColumnType::Timestamp).unwrap(),
            QueryParam::Timestamp(start)
        );
        assert_eq!(
            QueryParam::typed(&json!("2024-03-01 08:30:00"), ColumnType::Timestamp).unwrap(),
            QueryParam::Timestamp(start)
        );
        assert_eq!(
            QueryParam::typed(&json!("2024-03-01T08:30:00Z"), ColumnType::TimestampTz).unwrap(),
            QueryParam::TimestampTz(start.and_utc())
        );
        assert_eq!(
            QueryParam::typed(&json!("2024-03-01"), ColumnType::Date).unwrap(),
            QueryParam::Date(start.date())
        );

        let id = Uuid::new_v4();
        let serialized = serde_json::to_value(id).unwrap();
        assert_eq!(
            QueryParam::typed(&serialized, ColumnType::Uuid).unwrap(),
            QueryParam::Uuid(id)
        );
    }

    #[test]
    fn test_typed_bytes_from_serialized_vec() {
        let serialized = serde_json::to_value(vec![1u8, 2, 255]).unwrap();
        assert_eq!(
            QueryParam::typed(&serialized, ColumnType::Bytes).unwrap(),
            QueryParam::Bytes(vec![1, 2, 255])
        );
        assert!(QueryParam::typed(&json!([1, 256]), ColumnType::Bytes).is_err());
    }

    #[test]
    fn test_typed_null_and_mismatch() {
        assert_eq!(
            QueryParam::typed(&json!(null), ColumnType::Uuid).unwrap(),
            QueryParam::Null
        );
        assert!(QueryParam::typed(&json!("not a uuid"), ColumnType::Uuid).is_err());
        assert!(QueryParam::typed(&json!(5), ColumnType::Timestamp).is_err());
    }

    #[test]
    fn test_text_form_reads_back_through_serde() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let text = QueryParam::Timestamp(start).to_text().unwrap();
        let parsed: NaiveDateTime = serde_json::from_value(JsonValue::String(text)).unwrap();
        assert_eq!(parsed, start);
    }
}
