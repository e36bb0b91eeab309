//! Read/write API over compliance entries.
//!
//! Reads only ever see live entries (TTL not yet passed). Groups are keyed
//! either by detection or by entity; within a group the listing shows active
//! entries before suppressed ones, each ascending by the other axis.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use vigil_core::{
    Clock, ComplianceEntry, ComplianceStatus, EntryKey, Result, Severity, VigilError,
};

use crate::paging::{paginate, Paging};
use crate::rollup::{listing_order, rollup_status, tier, StatusCount, StatusTally};
use crate::store::ComplianceStore;
use crate::suppression::is_suppressed;


/// Axis for org-level rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgGrouping {
    Detection,
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgRow {
    pub id: String,
    pub status: ComplianceStatus,
}

/// Optional narrowing of a group listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub status: Option<ComplianceStatus>,
    pub suppressed: Option<bool>,
}

impl EntryFilter {
    fn accepts(&self, entry: &ComplianceEntry) -> bool {
        self.status.map_or(true, |s| entry.status == s)
            && self.suppressed.map_or(true, |s| entry.suppressed == s)
    }
}

/// One page of a detection's or entity's entries.
///
/// `status` and `counts` describe the whole group; `paging` and `entries`
/// reflect the filtered listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub id: String,
    pub status: ComplianceStatus,
    pub counts: StatusCount,
    pub paging: Paging,
    pub entries: Vec<ComplianceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub id: String,
    pub severity: Severity,
    pub counts: StatusCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub id: String,
    pub entity_type: String,
    /// Highest severity among the entity's active errors and failures.
    pub worst_severity: Option<Severity>,
    pub counts: StatusCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeCount {
    pub entity_type: String,
    /// Entities of this type by their rolled-up status.
    pub count: StatusTally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgOverview {
    /// Detections by severity and rolled-up status.
    pub applied_detections: BTreeMap<Severity, StatusTally>,
    pub scanned_entities: Vec<EntityTypeCount>,
    pub top_failing_detections: Vec<DetectionSummary>,
    pub top_failing_entities: Vec<EntitySummary>,
}

/// What a delete applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    Detection(String),
    Entity(String),
}

pub struct ComplianceAggregator {
    store: Arc<dyn ComplianceStore>,
    clock: Arc<dyn Clock>,
}

impl ComplianceAggregator {
    pub fn new(store: Arc<dyn ComplianceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // ── writes ──────────────────────────────────────────────────────

    /// Upsert a non-empty batch of entries.
    pub fn set_status(&self, entries: Vec<ComplianceEntry>) -> Result<()> {
        if entries.is_empty() {
            return Err(VigilError::Validation(
                "at least one compliance entry is required".to_string(),
            ));
        }
        for (i, e) in entries.iter().enumerate() {
            if e.detection_id.is_empty() || e.entity_id.is_empty() || e.integration_id.is_empty() {
                return Err(VigilError::Validation(format!(
                    "entry {} is missing a detection, entity or integration ID",
                    i
                )));
            }
        }
        let count = entries.len();
        self.store.upsert(entries)?;
        debug!(count, "compliance status set");
        Ok(())
    }

    /// Remove every entry of one detection or one entity.
    pub fn delete_status(&self, scope: &DeleteScope) -> Result<usize> {
        let keys: Vec<EntryKey> = self
            .store
            .scan()?
            .into_iter()
            .filter(|e| match scope {
                DeleteScope::Detection(id) => &e.detection_id == id,
                DeleteScope::Entity(id) => &e.entity_id == id,
            })
            .map(|e| e.key())
            .collect();
        let removed = self.store.delete(&keys)?;
        info!(?scope, removed, "compliance entries deleted");
        Ok(removed)
    }

    /// Re-apply a detection's severity and suppression patterns to its live
    /// entries. Returns how many entries were rewritten.
    pub fn update_metadata(
        &self,
        detection_id: &str,
        severity: Severity,
        suppressions: &[String],
    ) -> Result<usize> {
        let updated: Vec<ComplianceEntry> = self
            .live_entries()?
            .into_iter()
            .filter(|e| e.detection_id == detection_id)
            .filter_map(|mut e| {
                let suppressed = is_suppressed(suppressions, &e.entity_id);
                if e.severity == severity && e.suppressed == suppressed {
                    return None;
                }
                e.severity = severity;
                e.suppressed = suppressed;
                Some(e)
            })
            .collect();

        let count = updated.len();
        if count > 0 {
            self.store.upsert(updated)?;
        }
        info!(detection_id, %severity, updated = count, "compliance metadata updated");
        Ok(count)
    }

    // ── reads ───────────────────────────────────────────────────────

    /// The entry for one (detection, entity) pair.
    pub fn get_status(&self, detection_id: &str, entity_id: &str) -> Result<ComplianceEntry> {
        self.live_entries()?
            .into_iter()
            .filter(|e| e.detection_id == detection_id && e.entity_id == entity_id)
            .min_by(|a, b| a.integration_id.cmp(&b.integration_id))
            .ok_or_else(|| {
                VigilError::NotFound(format!(
                    "no compliance status for detection '{}' and entity '{}'",
                    detection_id, entity_id
                ))
            })
    }

    /// One row per detection or entity with its rolled-up status, ERROR rows
    /// first, then FAIL, then PASS; each tier ascending by ID.
    pub fn describe_org(&self, grouping: OrgGrouping) -> Result<Vec<OrgRow>> {
        let entries = self.live_entries()?;
        let groups = group_by(&entries, |e| match grouping {
            OrgGrouping::Detection => e.detection_id.as_str(),
            OrgGrouping::Entity => e.entity_id.as_str(),
        });

        let mut rows: Vec<OrgRow> = groups
            .into_iter()
            .map(|(id, members)| OrgRow {
                id: id.to_string(),
                status: rollup_status(members),
            })
            .collect();
        rows.sort_by(|a, b| tier(a.status).cmp(&tier(b.status)).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    pub fn describe_detection(
        &self,
        detection_id: &str,
        page: usize,
        page_size: usize,
        filter: &EntryFilter,
    ) -> Result<EntryPage> {
        self.describe_group(
            detection_id,
            page,
            page_size,
            filter,
            |e| e.detection_id.as_str(),
            |e| e.entity_id.as_str(),
            "detection",
        )
    }

    pub fn describe_entity(
        &self,
        entity_id: &str,
        page: usize,
        page_size: usize,
        filter: &EntryFilter,
    ) -> Result<EntryPage> {
        self.describe_group(
            entity_id,
            page,
            page_size,
            filter,
            |e| e.entity_id.as_str(),
            |e| e.detection_id.as_str(),
            "entity",
        )
    }

    /// Organisation-wide health: detections by severity, entities by type and
    /// the `limit` worst detections and entities.
    pub fn get_org_overview(&self, limit: usize) -> Result<OrgOverview> {
        let entries = self.live_entries()?;

        let mut applied_detections: BTreeMap<Severity, StatusTally> =
            Severity::ALL.iter().map(|s| (*s, StatusTally::default())).collect();
        let mut top_failing_detections = Vec::new();
        for (id, members) in group_by(&entries, |e| e.detection_id.as_str()) {
            let severity = members.iter().map(|e| e.severity).max().unwrap_or(Severity::Info);
            applied_detections
                .entry(severity)
                .or_default()
                .add(rollup_status(members.iter().copied()));
            let counts = StatusCount::from_entries(members.iter().copied());
            if is_failing(&counts) {
                top_failing_detections.push((
                    worst_failing_severity(&members),
                    DetectionSummary {
                        id: id.to_string(),
                        severity,
                        counts,
                    },
                ));
            }
        }

        let mut by_type: BTreeMap<String, StatusTally> = BTreeMap::new();
        let mut top_failing_entities = Vec::new();
        for (id, members) in group_by(&entries, |e| e.entity_id.as_str()) {
            let entity_type = members
                .first()
                .map(|e| e.entity_type.clone())
                .unwrap_or_default();
            by_type
                .entry(entity_type.clone())
                .or_default()
                .add(rollup_status(members.iter().copied()));
            let counts = StatusCount::from_entries(members.iter().copied());
            if is_failing(&counts) {
                let worst = worst_failing_severity(&members);
                top_failing_entities.push((
                    worst,
                    EntitySummary {
                        id: id.to_string(),
                        entity_type,
                        worst_severity: worst,
                        counts,
                    },
                ));
            }
        }

        top_failing_detections.sort_by(|(sa, a), (sb, b)| {
            rank(&a.counts, *sa, &b.counts, *sb).then_with(|| a.id.cmp(&b.id))
        });
        top_failing_entities.sort_by(|(sa, a), (sb, b)| {
            rank(&a.counts, *sa, &b.counts, *sb).then_with(|| a.id.cmp(&b.id))
        });

        Ok(OrgOverview {
            applied_detections,
            scanned_entities: by_type
                .into_iter()
                .map(|(entity_type, count)| EntityTypeCount { entity_type, count })
                .collect(),
            top_failing_detections: top_failing_detections
                .into_iter()
                .take(limit)
                .map(|(_, d)| d)
                .collect(),
            top_failing_entities: top_failing_entities
                .into_iter()
                .take(limit)
                .map(|(_, e)| e)
                .collect(),
        })
    }

    // ── internals ───────────────────────────────────────────────────

    fn live_entries(&self) -> Result<Vec<ComplianceEntry>> {
        let now = self.clock.now();
        let mut entries = self.store.scan()?;
        entries.retain(|e| !e.is_expired(now));
        Ok(entries)
    }

    #[allow(clippy::too_many_arguments)]
    fn describe_group(
        &self,
        id: &str,
        page: usize,
        page_size: usize,
        filter: &EntryFilter,
        group_key: fn(&ComplianceEntry) -> &str,
        cross_key: fn(&ComplianceEntry) -> &str,
        kind: &str,
    ) -> Result<EntryPage> {
        let mut members: Vec<ComplianceEntry> = self
            .live_entries()?
            .into_iter()
            .filter(|e| group_key(e) == id)
            .collect();
        if members.is_empty() {
            return Err(VigilError::NotFound(format!("{} '{}' has no compliance status", kind, id)));
        }

        let status = rollup_status(&members);
        let counts = StatusCount::from_entries(&members);

        members.retain(|e| filter.accepts(e));
        members.sort_by(listing_order(cross_key));
        let (paging, entries) = paginate(members, page, page_size)?;

        Ok(EntryPage {
            id: id.to_string(),
            status,
            counts,
            paging,
            entries,
        })
    }
}

fn group_by<'a>(
    entries: &'a [ComplianceEntry],
    key: impl Fn(&'a ComplianceEntry) -> &'a str,
) -> HashMap<&'a str, Vec<&'a ComplianceEntry>> {
    let mut groups: HashMap<&str, Vec<&ComplianceEntry>> = HashMap::new();
    for e in entries {
        groups.entry(key(e)).or_default().push(e);
    }
    groups
}

fn is_failing(counts: &StatusCount) -> bool {
    counts.active.error + counts.active.fail > 0
}

fn worst_failing_severity(members: &[&ComplianceEntry]) -> Option<Severity> {
    members
        .iter()
        .filter(|e| !e.suppressed && e.status != ComplianceStatus::Pass)
        .map(|e| e.severity)
        .max()
}

/// Most errors first, then most failures, then highest failing severity.
fn rank(
    a: &StatusCount,
    a_severity: Option<Severity>,
    b: &StatusCount,
    b_severity: Option<Severity>,
) -> std::cmp::Ordering {
    b.active
        .error
        .cmp(&a.active.error)
        .then_with(|| b.active.fail.cmp(&a.active.fail))
        .then_with(|| b_severity.cmp(&a_severity))
}
