//! Compliance entry storage.
//!
//! Entries have exactly one producer per key, so writes are plain
//! last-writer-wins upserts. The in-memory store also records a change log of
//! every mutation in the shape the forwarder consumes.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_core::{ChangeLogRecord, ChangeSource, ComplianceEntry, EntryKey, Result};

pub trait ComplianceStore: Send + Sync {
    /// Insert or replace entries by key.
    fn upsert(&self, entries: Vec<ComplianceEntry>) -> Result<()>;

    /// Every stored entry, including ones past their TTL.
    fn scan(&self) -> Result<Vec<ComplianceEntry>>;

    /// Remove entries by key, returning how many existed.
    fn delete(&self, keys: &[EntryKey]) -> Result<usize>;
}

#[derive(Default)]
pub struct MemoryComplianceStore {
    entries: RwLock<HashMap<EntryKey, ComplianceEntry>>,
    changes: Mutex<Vec<ChangeLogRecord>>,
}

impl MemoryComplianceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every change-log record recorded since the last drain, in order.
    pub fn drain_changes(&self) -> Vec<ChangeLogRecord> {
        std::mem::take(&mut *self.changes.lock().expect("changes lock poisoned"))
    }

    /// Drop entries whose TTL has passed, recording a removal for each.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<EntryKey> = self
            .entries
            .read()
            .expect("entries lock poisoned")
            .values()
            .filter(|e| e.is_expired(now))
            .map(ComplianceEntry::key)
            .collect();
        self.delete(&expired)
    }

    fn record(&self, old: Option<&ComplianceEntry>, new: Option<&ComplianceEntry>) -> Result<()> {
        if let Some(record) = ChangeLogRecord::from_images(ChangeSource::Compliance, old, new)? {
            self.changes.lock().expect("changes lock poisoned").push(record);
        }
        Ok(())
    }
}

impl ComplianceStore for MemoryComplianceStore {
    fn upsert(&self, entries: Vec<ComplianceEntry>) -> Result<()> {
        let mut guard = self.entries.write().expect("entries lock poisoned");
        for entry in entries {
            let previous = guard.insert(entry.key(), entry.clone());
            self.record(previous.as_ref(), Some(&entry))?;
        }
        debug!(total = guard.len(), "compliance entries upserted");
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ComplianceEntry>> {
        Ok(self
            .entries
            .read()
            .expect("entries lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn delete(&self, keys: &[EntryKey]) -> Result<usize> {
        let mut guard = self.entries.write().expect("entries lock poisoned");
        let mut removed = 0;
        for key in keys {
            if let Some(old) = guard.remove(key) {
                self.record(Some(&old), None)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
