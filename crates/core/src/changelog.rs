//! Change-log records as emitted by the compliance and entity stores.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{document_from_value, Document};
use crate::error::Result;

/// Store that produced a change-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Compliance,
    Entity,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSource::Compliance => write!(f, "compliance"),
            ChangeSource::Entity => write!(f, "entity"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Modify,
    Remove,
}

/// One ordered mutation from a store's change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogRecord {
    pub event_id: String,
    pub source: ChangeSource,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Document>,
}

impl ChangeLogRecord {
    pub fn new(
        source: ChangeSource,
        operation: Operation,
        old_image: Option<Document>,
        new_image: Option<Document>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            source,
            operation,
            old_image,
            new_image,
        }
    }

    /// Build a record from any serializable old/new pair, picking the
    /// operation from which images are present.
    pub fn from_images<T: Serialize>(
        source: ChangeSource,
        old: Option<&T>,
        new: Option<&T>,
    ) -> Result<Option<Self>> {
        let operation = match (old.is_some(), new.is_some()) {
            (false, true) => Operation::Insert,
            (true, true) => Operation::Modify,
            (true, false) => Operation::Remove,
            (false, false) => return Ok(None),
        };
        let old_image = old.map(to_document).transpose()?.flatten();
        let new_image = new.map(to_document).transpose()?.flatten();
        Ok(Some(Self::new(source, operation, old_image, new_image)))
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Option<Document>> {
    Ok(document_from_value(serde_json::to_value(value)?))
}
