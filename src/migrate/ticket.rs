//! Ticket migration
//!
//! The primary entity migrator. Single-ticket migration is create-only
//! idempotent: re-running it reports `AlreadyExists` without touching the
//! row. Refreshing an already-migrated ticket from a fresh source snapshot
//! goes through the explicit `update_one` instead.

use chrono::Utc;
use uuid::Uuid;

use crate::error::MigrateError;
use crate::migrate::batch::{run_batch, BatchOutcome};
use crate::migrate::classification::ClassificationMigrator;
use crate::models::{Classification, SourceTicket, Ticket, TicketFilter};
use crate::source::SourceDb;
use crate::store::TargetStore;

/// Outcome of a single-ticket migration. Already-exists and not-found are
/// expected results, not errors.
#[derive(Debug)]
pub enum TicketMigration {
    Migrated(Ticket),
    AlreadyExists(Ticket),
    NotFound,
}

impl TicketMigration {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Migrated(_) => "migrated",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound => "not_found",
        }
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Migrated(t) | Self::AlreadyExists(t) => Some(t),
            Self::NotFound => None,
        }
    }
}

pub struct TicketMigrator<'a> {
    source: &'a SourceDb,
    store: &'a TargetStore,
    max_concurrent: usize,
}

impl<'a> TicketMigrator<'a> {
    pub fn new(source: &'a SourceDb, store: &'a TargetStore, max_concurrent: usize) -> Self {
        Self {
            source,
            store,
            max_concurrent,
        }
    }

    /// Migrate one ticket by source id, cascading through classification and
    /// category creation as needed.
    pub async fn migrate_one(
        &self,
        source_ticket_id: i64,
    ) -> Result<TicketMigration, MigrateError> {
        let Some(source) = self.source.ticket(source_ticket_id)? else {
            return Ok(TicketMigration::NotFound);
        };

        if let Some(existing) = self.store.ticket_by_ref(source_ticket_id)? {
            tracing::debug!(source_ref = source_ticket_id, id = %existing.id, "ticket already migrated");
            return Ok(TicketMigration::AlreadyExists(existing));
        }

        let classification = self.resolve_classification(&source, true).await?;
        self.create_row(&source, &classification)
    }

    /// Migrate every source ticket matching the filter that is not present
    /// locally. Per-row failures are logged and counted without aborting the
    /// run.
    pub async fn migrate_batch(
        &self,
        filter: &TicketFilter,
    ) -> Result<BatchOutcome<SourceTicket, Ticket>, MigrateError> {
        let present = self.store.ticket_refs()?;
        let rows = self.source.tickets_matching(filter, &present)?;
        if rows.is_empty() {
            return Ok(BatchOutcome::empty());
        }

        tracing::info!(count = rows.len(), "migrating ticket batch");
        let outcome = run_batch(rows, self.max_concurrent, |row| async move {
            let classification = self.resolve_classification(&row, false).await?;
            match self.create_row(&row, &classification)? {
                TicketMigration::Migrated(t) | TicketMigration::AlreadyExists(t) => Ok(t),
                // Unreachable: create_row never reports NotFound.
                TicketMigration::NotFound => Err(MigrateError::SourceNotFound {
                    kind: "ticket",
                    id: row.id,
                }),
            }
        })
        .await;
        Ok(outcome)
    }

    /// Refresh an already-migrated ticket's mutable fields from the latest
    /// source snapshot.
    pub async fn update_one(&self, local_ticket_id: &str) -> Result<Ticket, MigrateError> {
        let mut ticket =
            self.store
                .ticket(local_ticket_id)?
                .ok_or_else(|| MigrateError::TargetNotFound {
                    kind: "ticket",
                    id: local_ticket_id.to_string(),
                })?;

        let source_ref = ticket.source_ref.ok_or_else(|| MigrateError::NotLinked {
            kind: "ticket",
            id: local_ticket_id.to_string(),
        })?;

        let source = self
            .source
            .ticket(source_ref)?
            .ok_or(MigrateError::SourceNotFound {
                kind: "ticket",
                id: source_ref,
            })?;

        let classification = self.resolve_classification(&source, false).await?;

        ticket.classification_id = classification.id;
        ticket.title = source.title;
        ticket.description = source.description;
        ticket.estimated_date = source.estimated_date;
        ticket.classification_date = source.classification_date;
        ticket.issue_number = source.issue_number;
        ticket.updated_at = Utc::now();

        self.store.update_ticket(&ticket)?;
        tracing::info!(id = %ticket.id, source_ref, "ticket refreshed from source");
        Ok(ticket)
    }

    /// Make the ticket's classification dependency resolvable, cascading to
    /// category creation when needed. With `backfill_siblings`, a cascade
    /// also migrates the remaining classifications under the same category
    /// so later tickets resolve without another cascade; sibling failures
    /// are isolated by the batch runner and never fail the ticket.
    async fn resolve_classification(
        &self,
        source: &SourceTicket,
        backfill_siblings: bool,
    ) -> Result<Classification, MigrateError> {
        if let Some(existing) = self.store.classification_by_ref(source.classification_id)? {
            return Ok(existing);
        }

        let migrator =
            ClassificationMigrator::new(self.source, self.store, self.max_concurrent);
        let classification = migrator.ensure(source.classification_id)?;

        if backfill_siblings {
            if let Some(category) = self.store.category(&classification.category_id)? {
                let outcome = migrator.migrate_all_for_category(&category).await?;
                if !outcome.is_clean() {
                    tracing::warn!(
                        category = %category.id,
                        failures = outcome.failures(),
                        "some sibling classifications failed to migrate"
                    );
                }
            }
        }

        Ok(classification)
    }

    fn create_row(
        &self,
        source: &SourceTicket,
        classification: &Classification,
    ) -> Result<TicketMigration, MigrateError> {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            source_ref: Some(source.id),
            classification_id: classification.id.clone(),
            title: source.title.clone(),
            description: source.description.clone(),
            estimated_date: source.estimated_date,
            classification_date: source.classification_date,
            issue_number: source.issue_number.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        match self.store.insert_ticket(&ticket) {
            Ok(()) => {
                tracing::info!(source_ref = source.id, id = %ticket.id, "ticket migrated");
                Ok(TicketMigration::Migrated(ticket))
            }
            Err(err) if err.is_unique_violation() => {
                let existing = self.store.ticket_by_ref(source.id)?.ok_or(err)?;
                Ok(TicketMigration::AlreadyExists(existing))
            }
            Err(err) => Err(err),
        }
    }
}
