//! Engine facade
//!
//! Wires the configuration into the two stores, content storage, and the
//! HTTP fetcher, and exposes the trigger-surface operations. External
//! callers (the CLI, an authorized HTTP handler) talk to this; the
//! individual migrators stay usable on their own for tests and embedding.

use crate::config::EngineConfig;
use crate::content::ContentStore;
use crate::error::MigrateError;
use crate::fetch::HttpFetcher;
use crate::migrate::batch::BatchOutcome;
use crate::migrate::category::CategoryMigrator;
use crate::migrate::classification::ClassificationMigrator;
use crate::migrate::comments::CommentMigrator;
use crate::migrate::files::{FileMigrationReport, FileMigrator};
use crate::migrate::report::{ReconciliationReport, Reporter};
use crate::migrate::ticket::{TicketMigration, TicketMigrator};
use crate::models::{
    Classification, Comment, SourceClassification, SourceComment, SourceTicket, Ticket,
    TicketFilter,
};
use crate::owner::Owner;
use crate::source::SourceDb;
use crate::store::{RecordKind, TargetStore};

pub struct MigrationEngine {
    config: EngineConfig,
    source: SourceDb,
    store: TargetStore,
    content: ContentStore,
    fetcher: HttpFetcher,
}

impl MigrationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, MigrateError> {
        config.validate()?;
        let source = SourceDb::open(&config.source.db_path, config.source.enabled)?;
        let store = TargetStore::open(&config.target.db_path)?;
        let content = ContentStore::new(&config.target.content_dir);
        content.init()?;
        let fetcher = HttpFetcher::new(config.source.fetch_timeout())?;
        Ok(Self {
            config,
            source,
            store,
            content,
            fetcher,
        })
    }

    pub fn store(&self) -> &TargetStore {
        &self.store
    }

    pub fn source(&self) -> &SourceDb {
        &self.source
    }

    fn cap(&self) -> usize {
        self.config.batch.max_concurrent
    }

    // -----------------------------------------------------------------------
    // Trigger surface
    // -----------------------------------------------------------------------

    pub async fn migrate_ticket(
        &self,
        source_ticket_id: i64,
    ) -> Result<TicketMigration, MigrateError> {
        TicketMigrator::new(&self.source, &self.store, self.cap())
            .migrate_one(source_ticket_id)
            .await
    }

    pub async fn migrate_tickets(
        &self,
        filter: &TicketFilter,
    ) -> Result<BatchOutcome<SourceTicket, Ticket>, MigrateError> {
        TicketMigrator::new(&self.source, &self.store, self.cap())
            .migrate_batch(filter)
            .await
    }

    pub async fn update_ticket(&self, local_ticket_id: &str) -> Result<Ticket, MigrateError> {
        TicketMigrator::new(&self.source, &self.store, self.cap())
            .update_one(local_ticket_id)
            .await
    }

    pub fn ensure_classification(
        &self,
        source_classification_id: i64,
    ) -> Result<Classification, MigrateError> {
        ClassificationMigrator::new(&self.source, &self.store, self.cap())
            .ensure(source_classification_id)
    }

    /// Ensure the category exists locally, then migrate all of its source
    /// classifications that are still missing.
    pub async fn migrate_classifications_for_category(
        &self,
        source_category_id: i64,
    ) -> Result<BatchOutcome<SourceClassification, Classification>, MigrateError> {
        let category =
            CategoryMigrator::new(&self.source, &self.store).ensure(source_category_id)?;
        ClassificationMigrator::new(&self.source, &self.store, self.cap())
            .migrate_all_for_category(&category)
            .await
    }

    pub async fn migrate_files(
        &self,
        source_file_ids: &[i64],
        owner: Option<&Owner>,
    ) -> Result<FileMigrationReport, MigrateError> {
        FileMigrator::new(
            &self.source,
            &self.store,
            &self.content,
            &self.fetcher,
            &self.config.source.file_endpoint,
            self.cap(),
        )
        .migrate_many(source_file_ids, owner)
        .await
    }

    pub async fn migrate_comments(
        &self,
        source_owner_type: &str,
        source_owner_id: i64,
        owner: &Owner,
    ) -> Result<BatchOutcome<SourceComment, Comment>, MigrateError> {
        CommentMigrator::new(&self.source, &self.store, self.cap())
            .migrate_many_by_owner(source_owner_type, source_owner_id, owner, &self.source)
            .await
    }

    /// Look up the local id a source record migrated to, if it has.
    pub fn lookup(&self, kind: RecordKind, source_ref: i64) -> Result<Option<String>, MigrateError> {
        self.store.local_id(kind, source_ref)
    }

    pub fn reconcile(&self, kind: RecordKind) -> Result<ReconciliationReport, MigrateError> {
        Reporter::new(&self.source, &self.store).reconcile(kind)
    }

    pub fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>, MigrateError> {
        Reporter::new(&self.source, &self.store).reconcile_all()
    }
}
