//! # Record ↔ Row Mapping
//!
//! Conversion between structured records and [`RowMap`]s, driven by serde
//! descriptors instead of hand-written per-entity code.
//!
//! ## Column Keys
//! Field names pass through serde: Rust's snake_case field names match
//! column keys directly, and explicit overrides are declared with
//! `#[serde(rename = "...")]` on the field. Enums stored in text columns
//! declare their database convention with `#[serde(rename_all = "...")]`.
//!
//! ## Absent vs Null
//! Decoding distinguishes the two the way serde does:
//! - key present with an explicit null → the field is set to `None`,
//! - key absent → the field's declared default applies (`#[serde(default)]`
//!   or `Option`),
//! - key absent, no default, non-optional field → mapping error carrying
//!   the target type name and the offending row payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreResult};
use crate::value::{DbValue, RowMap};

/// Converts a record into a row map.
///
/// The record must serialize to a JSON object; anything else (a bare
/// scalar, a sequence) cannot name its columns and is a mapping error.
pub fn to_row_map<T: Serialize>(record: &T) -> CoreResult<RowMap> {
    let value = serde_json::to_value(record).map_err(|e| {
        CoreError::row_mapping(std::any::type_name::<T>(), e.to_string(), "<unserialized>")
    })?;

    match value {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(key, v)| (key, DbValue::from_json(&v)))
            .collect()),
        other => Err(CoreError::row_mapping(
            std::any::type_name::<T>(),
            "record did not serialize to an object",
            other,
        )),
    }
}

/// Reconstructs a record from a row map.
///
/// Failures preserve the target type name and the row payload, so the
/// caller can render a diagnostic without re-querying.
pub fn from_row_map<T: DeserializeOwned>(row: &RowMap) -> CoreResult<T> {
    let object = JsonValue::Object(
        row.iter()
            .map(|(key, v)| (key.clone(), v.to_json()))
            .collect(),
    );

    serde_json::from_value(object.clone()).map_err(|e| {
        CoreError::row_mapping(std::any::type_name::<T>(), e.to_string(), object)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use uuid::Uuid;

    fn default_shelf() -> String {
        "unsorted".to_string()
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ShelfEntry {
        id: Uuid,
        name: String,
        #[serde(rename = "sort_key")]
        ordering: i64,
        rating: Option<i64>,
        #[serde(default = "default_shelf")]
        shelf: String,
    }

    fn sample() -> ShelfEntry {
        ShelfEntry {
            id: Uuid::new_v4(),
            name: "Disco Elysium".to_string(),
            ordering: 4,
            rating: None,
            shelf: "favorites".to_string(),
        }
    }

    #[test]
    fn round_trip_is_identity() {
        let entry = sample();
        let row = to_row_map(&entry).unwrap();
        let back: ShelfEntry = from_row_map(&row).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn explicit_override_controls_column_key() {
        let row = to_row_map(&sample()).unwrap();
        assert!(row.contains_key("sort_key"));
        assert!(!row.contains_key("ordering"));
    }

    #[test]
    fn explicit_null_sets_optional_field() {
        let mut row = to_row_map(&sample()).unwrap();
        row.insert("rating".to_string(), DbValue::Null);
        let back: ShelfEntry = from_row_map(&row).unwrap();
        assert_eq!(back.rating, None);
    }

    #[test]
    fn absent_key_uses_declared_default() {
        let mut row = to_row_map(&sample()).unwrap();
        row.remove("shelf");
        let back: ShelfEntry = from_row_map(&row).unwrap();
        assert_eq!(back.shelf, "unsorted");
    }

    #[test]
    fn absent_required_key_fails_with_context() {
        let mut row = to_row_map(&sample()).unwrap();
        row.remove("name");
        let err = from_row_map::<ShelfEntry>(&row).unwrap_err();
        match err {
            CoreError::RowMapping { target, row, .. } => {
                assert!(target.contains("ShelfEntry"));
                assert!(row.contains("sort_key"));
            }
            other => panic!("expected RowMapping, got {other:?}"),
        }
    }

    #[test]
    fn scalar_record_is_rejected() {
        let err = to_row_map(&42i64).unwrap_err();
        assert!(matches!(err, CoreError::RowMapping { .. }));
    }
}
