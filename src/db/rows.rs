//! Row decoding into JSON maps.
//!
//! Rows from every backend are converted to `serde_json::Map`s keyed by
//! column name, in select order. Entities and scalars are then mapped from
//! those maps with `serde`.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::db::dialect::SqlDialect;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::str::FromStr;

pub type JsonRow = serde_json::Map<String, JsonValue>;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: SqlDialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == SqlDialect::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// A JSON number when an `f64` holds the value exactly, otherwise the exact
/// decimal text. `Decimal` fields deserialize from either form.
fn decimal_value(v: Decimal) -> JsonValue {
    match v.to_f64() {
        Some(f) if Decimal::from_str(&f.to_string()).is_ok_and(|back| back == v) => float_value(f),
        _ => JsonValue::String(v.to_string()),
    }
}

fn binary_value(bytes: Vec<u8>) -> JsonValue {
    JsonValue::Array(bytes.into_iter().map(JsonValue::from).collect())
}

fn temporal_value<T: serde::Serialize>(v: T) -> JsonValue {
    serde_json::to_value(v).unwrap_or(JsonValue::Null)
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, SqlDialect::MySql);
                let value = mysql::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, SqlDialect::PostgreSql);
                let value = postgres::decode_column(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = categorize_type(col.type_info().name(), SqlDialect::Sqlite);
                let value = sqlite::decode_column(self, idx, declared);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for tiberius::Row {
    fn to_json_map(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let value = mssql::decode_column(self, idx, mssql::categorize(col.column_type()));
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<Decimal>, _>(idx) {
            Ok(Some(v)) => decimal_value(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(binary_value)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return temporal_value(v);
        }
        JsonValue::Null
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<Decimal>, _>(idx) {
            Ok(Some(v)) => decimal_value(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(binary_value)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return temporal_value(v);
        }
        JsonValue::Null
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    /// Decode by the stored value's runtime type.
    ///
    /// SQLite columns are dynamically typed, and expressions such as
    /// `COUNT(*)` carry no declared type, so only booleans rely on the
    /// declared column type.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        let Ok(raw) = row.try_get_raw(idx) else {
            return JsonValue::Null;
        };
        if raw.is_null() {
            return JsonValue::Null;
        }
        let storage = raw.type_info().name().to_uppercase();

        if declared == TypeCategory::Boolean && storage == "INTEGER" {
            return row
                .try_get_unchecked::<i64, _>(idx)
                .map(|v| JsonValue::Bool(v != 0))
                .unwrap_or(JsonValue::Null);
        }

        match storage.as_str() {
            "INTEGER" => row
                .try_get_unchecked::<i64, _>(idx)
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            "REAL" => row
                .try_get_unchecked::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            "BLOB" => row
                .try_get_unchecked::<Vec<u8>, _>(idx)
                .map(binary_value)
                .unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx, declared),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        match row.try_get_unchecked::<String, _>(idx) {
            Ok(v) if declared == TypeCategory::Json => {
                serde_json::from_str::<JsonValue>(&v).unwrap_or(JsonValue::String(v))
            }
            Ok(v) => JsonValue::String(v),
            Err(_) => JsonValue::Null,
        }
    }
}

mod mssql {
    use super::*;
    use tiberius::ColumnType;

    /// SQL Server reports its wire type, not a type name.
    pub fn categorize(column_type: ColumnType) -> TypeCategory {
        match column_type {
            ColumnType::Bit | ColumnType::Bitn => TypeCategory::Boolean,
            ColumnType::Int1
            | ColumnType::Int2
            | ColumnType::Int4
            | ColumnType::Int8
            | ColumnType::Intn => TypeCategory::Integer,
            ColumnType::Float4 | ColumnType::Float8 | ColumnType::Floatn => TypeCategory::Float,
            ColumnType::Money
            | ColumnType::Money4
            | ColumnType::Decimaln
            | ColumnType::Numericn => TypeCategory::Decimal,
            ColumnType::Guid => TypeCategory::Uuid,
            ColumnType::Datetime
            | ColumnType::Datetime4
            | ColumnType::Datetimen
            | ColumnType::Datetime2
            | ColumnType::Daten
            | ColumnType::Timen
            | ColumnType::DatetimeOffsetn => TypeCategory::Temporal,
            ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => {
                TypeCategory::Binary
            }
            _ => TypeCategory::Text,
        }
    }

    pub fn decode_column(row: &tiberius::Row, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &tiberius::Row, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Decimal, _>(idx) {
            return decimal_value(v);
        }
        // MONEY arrives as a float
        decode_float(row, idx)
    }

    fn decode_integer(row: &tiberius::Row, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<u8, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &tiberius::Row, idx: usize) -> JsonValue {
        row.try_get::<bool, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &tiberius::Row, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<f32, _>(idx) {
            return float_value(f64::from(v));
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &tiberius::Row, idx: usize) -> JsonValue {
        row.try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map(|bytes| binary_value(bytes.to_vec()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &tiberius::Row, idx: usize) -> JsonValue {
        row.try_get::<uuid::Uuid, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &tiberius::Row, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<chrono::DateTime<chrono::FixedOffset>, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<chrono::NaiveDate, _>(idx) {
            return temporal_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<chrono::NaiveTime, _>(idx) {
            return temporal_value(v);
        }
        JsonValue::Null
    }

    fn decode_text(row: &tiberius::Row, idx: usize) -> JsonValue {
        row.try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }
}
