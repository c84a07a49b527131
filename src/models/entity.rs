//! Entity mapping.
//!
//! An entity is a `serde` type whose serialized field names are the table's
//! column names. The trait supplies the table metadata the CRUD facade needs.

use crate::db::params::{ColumnType, QueryParam};
use crate::db::rows::JsonRow;
use crate::error::{DbError, DbResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// A type persisted as one row of [`Entity::TABLE`].
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct Color { id: i64, name: String, created: NaiveDateTime }
///
/// impl Entity for Color {
///     const TABLE: &'static str = "Color";
///     const KEY_COLUMN: &'static str = "Id";
///     const GENERATED_KEY: bool = true;
///     const NAME_COLUMN: Option<&'static str> = Some("Name");
///     const COLUMN_TYPES: &'static [(&'static str, ColumnType)] =
///         &[("Created", ColumnType::Timestamp)];
///
///     fn set_generated_key(&mut self, key: i64) { self.id = key; }
///     fn name(&self) -> Option<&str> { Some(&self.name) }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: &'static str;
    const KEY_COLUMN: &'static str;
    /// The database assigns the key on insert
    const GENERATED_KEY: bool = false;
    /// Column whose values must be unique across the table
    const NAME_COLUMN: Option<&'static str> = None;
    /// SQL types of the columns whose serialized form loses them
    const COLUMN_TYPES: &'static [(&'static str, ColumnType)] = &[];

    /// Short type name used in logs and error messages.
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Store the key generated by an insert.
    fn set_generated_key(&mut self, _key: i64) {}

    /// Value of [`Entity::NAME_COLUMN`] for this entity.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// An entity keyed by a numeric id.
pub trait IdentifiedEntity: Entity {
    fn id(&self) -> i64;
}

/// Serialize an entity into its column map.
pub(crate) fn to_columns<T: Entity>(entity: &T) -> DbResult<JsonRow> {
    match serde_json::to_value(entity) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(DbError::mapping(
            T::entity_name(),
            format!("expected a struct, serialized to {other}"),
        )),
        Err(e) => Err(DbError::mapping(T::entity_name(), e.to_string())),
    }
}

fn column_type<T: Entity>(column: &str) -> Option<ColumnType> {
    T::COLUMN_TYPES
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, column_type)| *column_type)
}

/// Convert one serialized column into a parameter, honoring its type hint.
fn column_param<T: Entity>(column: &str, value: &JsonValue) -> DbResult<QueryParam> {
    match column_type::<T>(column) {
        Some(column_type) => QueryParam::typed(value, column_type)
            .map_err(|e| DbError::mapping(T::entity_name(), format!("column '{column}': {e}"))),
        None => Ok(QueryParam::from(value)),
    }
}

/// Read the key column out of a column map.
pub(crate) fn key_param<T: Entity>(columns: &JsonRow) -> DbResult<QueryParam> {
    let value = columns.get(T::KEY_COLUMN).ok_or_else(|| {
        DbError::mapping(
            T::entity_name(),
            format!("key column '{}' is not serialized", T::KEY_COLUMN),
        )
    })?;
    column_param::<T>(T::KEY_COLUMN, value)
}

/// Column/value pairs, optionally leaving out the key column.
pub(crate) fn column_params<T: Entity>(
    columns: JsonRow,
    skip: Option<&str>,
) -> DbResult<Vec<(String, QueryParam)>> {
    columns
        .into_iter()
        .filter(|(name, _)| Some(name.as_str()) != skip)
        .map(|(name, value)| {
            let param = column_param::<T>(&name, &value)?;
            Ok((name, param))
        })
        .collect()
}

/// Deserialize a row into an entity.
pub(crate) fn from_row<T: DeserializeOwned>(entity: &str, row: JsonRow) -> DbResult<T> {
    serde_json::from_value(JsonValue::Object(row)).map_err(|e| DbError::mapping(entity, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "PascalCase")]
    struct Widget {
        widget_id: i64,
        name: String,
        size: Option<String>,
    }

    impl Entity for Widget {
        const TABLE: &'static str = "Widget";
        const KEY_COLUMN: &'static str = "WidgetId";
        const GENERATED_KEY: bool = true;
    }

    #[test]
    fn test_entity_name_strips_module_path() {
        assert_eq!(Widget::entity_name(), "Widget");
    }

    #[test]
    fn test_columns_keep_field_order() {
        let widget = Widget {
            widget_id: 4,
            name: "Gear".into(),
            size: None,
        };
        let columns = to_columns(&widget).unwrap();
        let names: Vec<_> = columns.keys().cloned().collect();
        assert_eq!(names, vec!["WidgetId", "Name", "Size"]);
        assert_eq!(key_param::<Widget>(&columns).unwrap(), QueryParam::Int(4));

        let params = column_params::<Widget>(columns, Some("WidgetId")).unwrap();
        assert_eq!(
            params,
            vec![
                ("Name".to_string(), QueryParam::from("Gear")),
                ("Size".to_string(), QueryParam::Null),
            ]
        );
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "PascalCase")]
    struct Invoice {
        number: String,
        total: Decimal,
        issued: NaiveDateTime,
        scan: Option<Vec<u8>>,
    }

    impl Entity for Invoice {
        const TABLE: &'static str = "Invoice";
        const KEY_COLUMN: &'static str = "Number";
        const COLUMN_TYPES: &'static [(&'static str, ColumnType)] = &[
            ("Total", ColumnType::Decimal),
            ("Issued", ColumnType::Timestamp),
            ("Scan", ColumnType::Bytes),
        ];
    }

    #[test]
    fn test_column_types_keep_sql_types() {
        let issued = NaiveDate::from_ymd_opt(2023, 11, 5)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let invoice = Invoice {
            number: "INV-7".into(),
            total: Decimal::new(1234567, 2),
            issued,
            scan: Some(vec![0, 7, 255]),
        };
        let columns = to_columns(&invoice).unwrap();
        assert_eq!(key_param::<Invoice>(&columns).unwrap(), QueryParam::from("INV-7"));

        let params = column_params::<Invoice>(columns, None).unwrap();
        assert_eq!(
            params,
            vec![
                ("Number".to_string(), QueryParam::from("INV-7")),
                ("Total".to_string(), QueryParam::Decimal(Decimal::new(1234567, 2))),
                ("Issued".to_string(), QueryParam::Timestamp(issued)),
                ("Scan".to_string(), QueryParam::Bytes(vec![0, 7, 255])),
            ]
        );
    }

    #[test]
    fn test_bad_typed_column_is_a_mapping_error() {
        let mut columns = JsonRow::new();
        columns.insert("Number".into(), JsonValue::from("INV-8"));
        columns.insert("Total".into(), JsonValue::from("twelve"));
        let err = column_params::<Invoice>(columns, None).unwrap_err();
        assert!(matches!(err, DbError::Mapping { .. }));
        assert!(err.to_string().contains("Total"));
    }

    #[test]
    fn test_from_row_reports_mapping_errors() {
        let mut row = JsonRow::new();
        row.insert("WidgetId".into(), JsonValue::from(1));
        let err = from_row::<Widget>("Widget", row).unwrap_err();
        assert!(matches!(err, DbError::Mapping { .. }));
    }
}
