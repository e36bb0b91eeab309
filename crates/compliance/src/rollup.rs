//! Status precedence, counting and listing order for groups of entries.

use std::cmp::Ordering;

use serde::Serialize;

use vigil_core::{ComplianceEntry, ComplianceStatus};

/// PASS / FAIL / ERROR counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
}

impl StatusTally {
    pub fn add(&mut self, status: ComplianceStatus) {
        match status {
            ComplianceStatus::Pass => self.pass += 1,
            ComplianceStatus::Fail => self.fail += 1,
            ComplianceStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.error
    }
}

/// Status counts split into disjoint active and suppressed partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub active: StatusTally,
    pub suppressed: StatusTally,
}

impl StatusCount {
    pub fn record(&mut self, entry: &ComplianceEntry) {
        if entry.suppressed {
            self.suppressed.add(entry.status);
        } else {
            self.active.add(entry.status);
        }
    }

    pub fn total(&self) -> usize {
        self.active.total() + self.suppressed.total()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ComplianceEntry>) -> Self {
        let mut count = Self::default();
        for e in entries {
            count.record(e);
        }
        count
    }
}

/// Rolled-up status of a group: ERROR over FAIL over PASS, considering only
/// active entries. Suppressed entries never raise the group status.
pub fn rollup_status<'a>(entries: impl IntoIterator<Item = &'a ComplianceEntry>) -> ComplianceStatus {
    let mut status = ComplianceStatus::Pass;
    for entry in entries.into_iter().filter(|e| !e.suppressed) {
        match entry.status {
            ComplianceStatus::Error => return ComplianceStatus::Error,
            ComplianceStatus::Fail => status = ComplianceStatus::Fail,
            ComplianceStatus::Pass => {}
        }
    }
    status
}

/// Sort position of a status tier: ERROR first, then FAIL, then PASS.
pub fn tier(status: ComplianceStatus) -> u8 {
    match status {
        ComplianceStatus::Error => 0,
        ComplianceStatus::Fail => 1,
        ComplianceStatus::Pass => 2,
    }
}

/// Active entries before suppressed ones, each partition ascending by the
/// cross-axis key. The integration ID breaks remaining ties.
pub fn listing_order(
    cross_key: fn(&ComplianceEntry) -> &str,
) -> impl Fn(&ComplianceEntry, &ComplianceEntry) -> Ordering {
    move |a: &ComplianceEntry, b: &ComplianceEntry| {
        a.suppressed
            .cmp(&b.suppressed)
            .then_with(|| cross_key(a).cmp(cross_key(b)))
            .then_with(|| a.integration_id.cmp(&b.integration_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::Severity;

    fn entry(entity: &str, status: ComplianceStatus, suppressed: bool) -> ComplianceEntry {
        ComplianceEntry {
            detection_id: "P".to_string(),
            entity_id: entity.to_string(),
            integration_id: "acct".to_string(),
            entity_type: "T".to_string(),
            status,
            severity: Severity::Medium,
            suppressed,
            error_message: None,
            last_updated: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn suppressed_fail_does_not_change_pass_group() {
        let mut group = vec![entry("a", ComplianceStatus::Pass, false)];
        assert_eq!(rollup_status(&group), ComplianceStatus::Pass);
        group.push(entry("b", ComplianceStatus::Fail, true));
        assert_eq!(rollup_status(&group), ComplianceStatus::Pass);
        group.push(entry("c", ComplianceStatus::Error, true));
        assert_eq!(rollup_status(&group), ComplianceStatus::Pass);
    }

    #[test]
    fn active_error_always_wins() {
        let group = vec![
            entry("a", ComplianceStatus::Fail, false),
            entry("b", ComplianceStatus::Pass, true),
            entry("c", ComplianceStatus::Error, false),
        ];
        assert_eq!(rollup_status(&group), ComplianceStatus::Error);
    }

    #[test]
    fn empty_group_is_pass() {
        assert_eq!(rollup_status(&Vec::<ComplianceEntry>::new()), ComplianceStatus::Pass);
    }

    #[test]
    fn counts_partition_by_suppression() {
        let group = vec![
            entry("a", ComplianceStatus::Fail, false),
            entry("b", ComplianceStatus::Fail, true),
            entry("c", ComplianceStatus::Pass, false),
            entry("d", ComplianceStatus::Error, true),
        ];
        let count = StatusCount::from_entries(&group);
        assert_eq!(count.active, StatusTally { pass: 1, fail: 1, error: 0 });
        assert_eq!(count.suppressed, StatusTally { pass: 0, fail: 1, error: 1 });
        assert_eq!(count.total(), group.len());
    }

    #[test]
    fn listing_puts_active_first_then_sorts_by_key() {
        let mut group = vec![
            entry("z", ComplianceStatus::Pass, false),
            entry("a", ComplianceStatus::Fail, true),
            entry("m", ComplianceStatus::Error, false),
        ];
        group.sort_by(listing_order(|e| e.entity_id.as_str()));
        let ids: Vec<&str> = group.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }
}
