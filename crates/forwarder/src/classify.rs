//! Turning change-log records into analytics change documents.
//!
//! Classification is pure: the same record always yields the same outcome,
//! so a batch can be forwarded again after a partial failure.

use serde::Serialize;
use serde_json::Value;

use vigil_core::{
    document_from_value, shallow_diff, ChangeLogRecord, ChangeSource, Document, DocumentDiff,
    Operation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

/// Status transition of one compliance entry. `snapshot` is the entry as it
/// stands after the change (before it, for deletions).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceChange {
    pub change_type: ChangeType,
    pub event_id: String,
    pub integration_id: String,
    pub integration_label: String,
    pub detection_id: String,
    pub entity_id: String,
    pub snapshot: Document,
}

/// Lifecycle or attribute change of one entity. Creations and deletions carry
/// the full attribute `snapshot`; modifications carry only `changes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshotChange {
    pub change_type: ChangeType,
    pub event_id: String,
    pub integration_id: String,
    pub integration_label: String,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<DocumentDiff>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "recordType", rename_all = "camelCase")]
pub enum ChangeRecord {
    ComplianceChange(ComplianceChange),
    EntitySnapshotChange(EntitySnapshotChange),
}

impl ChangeRecord {
    pub fn integration_id(&self) -> &str {
        match self {
            ChangeRecord::ComplianceChange(c) => &c.integration_id,
            ChangeRecord::EntitySnapshotChange(c) => &c.integration_id,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            ChangeRecord::ComplianceChange(c) => &c.event_id,
            ChangeRecord::EntitySnapshotChange(c) => &c.event_id,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangeRecord::ComplianceChange(c) => c.change_type,
            ChangeRecord::EntitySnapshotChange(c) => c.change_type,
        }
    }

    pub fn integration_label(&self) -> &str {
        match self {
            ChangeRecord::ComplianceChange(c) => &c.integration_label,
            ChangeRecord::EntitySnapshotChange(c) => &c.integration_label,
        }
    }

    pub fn with_label(mut self, label: String) -> Self {
        match &mut self {
            ChangeRecord::ComplianceChange(c) => c.integration_label = label,
            ChangeRecord::EntitySnapshotChange(c) => c.integration_label = label,
        }
        self
    }
}

/// Outcome of classifying one change-log record.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A change worth shipping. The integration label is still blank.
    Emit(ChangeRecord),
    /// A modification that touched nothing tracked downstream.
    Unchanged,
    /// The record lacks an image or an identifying field.
    Malformed(String),
}

pub fn classify(record: &ChangeLogRecord) -> Classification {
    let outcome = match record.source {
        ChangeSource::Compliance => classify_compliance(record),
        ChangeSource::Entity => classify_entity(record),
    };
    match outcome {
        Ok(Some(change)) => Classification::Emit(change),
        Ok(None) => Classification::Unchanged,
        Err(reason) => Classification::Malformed(reason),
    }
}

type Classified = std::result::Result<Option<ChangeRecord>, String>;

fn classify_compliance(record: &ChangeLogRecord) -> Classified {
    let (change_type, image) = match record.operation {
        Operation::Insert => (ChangeType::Created, required_image(&record.new_image, "new")?),
        Operation::Remove => (ChangeType::Deleted, required_image(&record.old_image, "old")?),
        Operation::Modify => {
            let old = required_image(&record.old_image, "old")?;
            let new = required_image(&record.new_image, "new")?;
            if old.get("status") == new.get("status") && old.get("suppressed") == new.get("suppressed") {
                return Ok(None);
            }
            (ChangeType::Modified, new)
        }
    };

    Ok(Some(ChangeRecord::ComplianceChange(ComplianceChange {
        change_type,
        event_id: record.event_id.clone(),
        integration_id: required_id(image, "integrationId")?,
        integration_label: String::new(),
        detection_id: required_id(image, "detectionId")?,
        entity_id: required_id(image, "entityId")?,
        snapshot: image.clone(),
    })))
}

fn classify_entity(record: &ChangeLogRecord) -> Classified {
    let (change_type, image, snapshot, changes) = match record.operation {
        Operation::Insert => {
            let image = required_image(&record.new_image, "new")?;
            (ChangeType::Created, image, Some(attributes(image)?), None)
        }
        Operation::Remove => {
            let image = required_image(&record.old_image, "old")?;
            (ChangeType::Deleted, image, Some(attributes(image)?), None)
        }
        Operation::Modify => {
            let old = required_image(&record.old_image, "old")?;
            let new = required_image(&record.new_image, "new")?;
            let diff = shallow_diff(&attributes(old)?, &attributes(new)?);
            if diff.is_empty() {
                return Ok(None);
            }
            (ChangeType::Modified, new, None, Some(diff))
        }
    };

    Ok(Some(ChangeRecord::EntitySnapshotChange(EntitySnapshotChange {
        change_type,
        event_id: record.event_id.clone(),
        integration_id: required_id(image, "integrationId")?,
        integration_label: String::new(),
        entity_id: required_id(image, "entityId")?,
        entity_type: image
            .get("entityType")
            .and_then(Value::as_str)
            .map(str::to_string),
        snapshot,
        changes,
    })))
}

fn required_image<'a>(image: &'a Option<Document>, which: &str) -> std::result::Result<&'a Document, String> {
    image.as_ref().ok_or_else(|| format!("missing {which} image"))
}

fn required_id(image: &Document, key: &str) -> std::result::Result<String, String> {
    match image.get(key).and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(format!("missing {key}")),
    }
}

/// The entity's `attributes` map. Images without one are treated as a flat
/// attribute document.
fn attributes(image: &Document) -> std::result::Result<Document, String> {
    match image.get("attributes") {
        None => Ok(image.clone()),
        Some(value) => document_from_value(value.clone())
            .ok_or_else(|| "attributes is not an object".to_string()),
    }
}
