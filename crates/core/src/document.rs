//! Ordered, schema-less key-value documents as carried by change-log images.
//!
//! Values are opaque JSON: only top-level key presence and equality are ever
//! inspected, never their inner structure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flat, insertion-ordered map of top-level keys to opaque JSON values.
pub type Document = IndexMap<String, Value>;

/// Change of a single top-level key between two document versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
}

/// Shallow diff keyed by the top-level field that changed.
pub type DocumentDiff = IndexMap<String, FieldChange>;

/// Compute the top-level diff from `old` to `new`.
///
/// Keys keep the order of `old`, followed by keys only present in `new`.
/// Nested values are compared as a whole.
pub fn shallow_diff(old: &Document, new: &Document) -> DocumentDiff {
    let mut diff = DocumentDiff::new();

    for (key, old_value) in old {
        match new.get(key) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                diff.insert(
                    key.clone(),
                    FieldChange {
                        from: Some(old_value.clone()),
                        to: Some(new_value.clone()),
                    },
                );
            }
            None => {
                diff.insert(
                    key.clone(),
                    FieldChange {
                        from: Some(old_value.clone()),
                        to: None,
                    },
                );
            }
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            diff.insert(
                key.clone(),
                FieldChange {
                    from: None,
                    to: Some(new_value.clone()),
                },
            );
        }
    }

    diff
}

/// Lift a JSON value into a [`Document`]; anything but an object yields `None`.
pub fn document_from_value(value: Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
