//! Compliance status storage and organisation-wide rollups.
//!
//! This crate provides:
//! - `ComplianceStore` contract plus an in-memory store that records a change log
//! - Status precedence, listing order and status counting helpers
//! - 1-based paging
//! - `ComplianceAggregator`: the read/write API over compliance entries

pub mod aggregator;
pub mod paging;
pub mod rollup;
pub mod store;
pub mod suppression;

pub use aggregator::{ComplianceAggregator, DeleteScope, EntryFilter, EntryPage, OrgGrouping, OrgOverview, OrgRow};
pub use paging::Paging;
pub use rollup::{StatusCount, StatusTally};
pub use store::{ComplianceStore, MemoryComplianceStore};
