//! Shared data model: detections, unit tests and compliance entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a detection runs against cloud resources or log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionType {
    Policy,
    Rule,
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionType::Policy => write!(f, "POLICY"),
            DetectionType::Rule => write!(f, "RULE"),
        }
    }
}

/// Detection priority tier, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: '{}'", other)),
        }
    }
}

/// A single user-authored unit test. Its identity is its position in
/// [`Detection::tests`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitTest {
    pub name: String,
    pub expected_result: bool,
    /// JSON text of the resource (policies) or event (rules) under test.
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: String,
    pub detection_type: DetectionType,
    pub body: String,
    /// Resource types (policies) or log types (rules) this detection applies to.
    #[serde(default)]
    pub applies_to: Vec<String>,
    pub severity: Severity,
    pub enabled: bool,
    #[serde(default)]
    pub tests: Vec<UnitTest>,
}

/// Outcome of one detection against one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceStatus {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Pass => write!(f, "PASS"),
            ComplianceStatus::Fail => write!(f, "FAIL"),
            ComplianceStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Unique key of a [`ComplianceEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    pub detection_id: String,
    pub entity_id: String,
    pub integration_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceEntry {
    pub detection_id: String,
    pub entity_id: String,
    pub integration_id: String,
    pub entity_type: String,
    pub status: ComplianceStatus,
    pub severity: Severity,
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ComplianceEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            detection_id: self.detection_id.clone(),
            entity_id: self.entity_id.clone(),
            integration_id: self.integration_id.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
