//! Reconciliation reporting
//!
//! Aggregate counts for observability: how many rows the source holds, how
//! many the target holds, how many of those carry a source reference, and
//! how many source rows are still pending.

use serde::Serialize;

use crate::error::MigrateError;
use crate::source::SourceDb;
use crate::store::{RecordKind, TargetStore};

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub kind: RecordKind,
    pub source_total: u64,
    pub target_total: u64,
    /// Target rows that carry a source reference.
    pub migrated: u64,
    /// Source rows with no migrated counterpart yet.
    pub pending: u64,
}

pub struct Reporter<'a> {
    source: &'a SourceDb,
    store: &'a TargetStore,
}

impl<'a> Reporter<'a> {
    pub fn new(source: &'a SourceDb, store: &'a TargetStore) -> Self {
        Self { source, store }
    }

    pub fn reconcile(&self, kind: RecordKind) -> Result<ReconciliationReport, MigrateError> {
        let source_total = self.source.count(kind)?;
        let target_total = self.store.count(kind)?;
        let migrated = self.store.count_with_ref(kind)?;
        Ok(ReconciliationReport {
            kind,
            source_total,
            target_total,
            migrated,
            pending: source_total.saturating_sub(migrated),
        })
    }

    pub fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>, MigrateError> {
        RecordKind::ALL
            .into_iter()
            .map(|kind| self.reconcile(kind))
            .collect()
    }
}
