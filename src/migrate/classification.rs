//! Classification migration
//!
//! A classification depends on its parent category, so `ensure` cascades
//! through the category migrator before creating anything. Bulk migration
//! for a whole category computes one set-based diff against the target
//! instead of an existence check per row.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::error::MigrateError;
use crate::migrate::batch::{run_batch, BatchOutcome};
use crate::migrate::category::CategoryMigrator;
use crate::models::{Category, Classification, SourceClassification};
use crate::source::SourceDb;
use crate::store::TargetStore;

pub struct ClassificationMigrator<'a> {
    source: &'a SourceDb,
    store: &'a TargetStore,
    max_concurrent: usize,
}

impl<'a> ClassificationMigrator<'a> {
    pub fn new(source: &'a SourceDb, store: &'a TargetStore, max_concurrent: usize) -> Self {
        Self {
            source,
            store,
            max_concurrent,
        }
    }

    /// Ensure a local classification exists for the given source id,
    /// cascading to the category migrator for the parent.
    pub fn ensure(&self, source_classification_id: i64) -> Result<Classification, MigrateError> {
        if let Some(existing) = self.store.classification_by_ref(source_classification_id)? {
            return Ok(existing);
        }

        let source = self.source.classification(source_classification_id)?.ok_or(
            MigrateError::SourceNotFound {
                kind: "classification",
                id: source_classification_id,
            },
        )?;

        let category = CategoryMigrator::new(self.source, self.store)
            .ensure(source.category_id)
            .map_err(|err| match err {
                MigrateError::SourceNotFound { .. } => MigrateError::DependencyUnresolvable {
                    kind: "category",
                    id: source.category_id,
                    reason: err.to_string(),
                },
                other => other,
            })?;

        self.create_row(&source, &category)
    }

    /// Migrate every source classification under the given local category
    /// that is not present yet. One bulk diff decides the work list; items
    /// then insert directly without per-row existence checks.
    pub async fn migrate_all_for_category(
        &self,
        category: &Category,
    ) -> Result<BatchOutcome<SourceClassification, Classification>, MigrateError> {
        let source_rows = self
            .source
            .classifications_by_category(category.source_ref)?;
        let present: HashSet<i64> = self
            .store
            .classification_refs_for_category(&category.id)?
            .into_iter()
            .collect();

        let missing: Vec<SourceClassification> = source_rows
            .into_iter()
            .filter(|row| !present.contains(&row.id))
            .collect();

        if missing.is_empty() {
            return Ok(BatchOutcome::empty());
        }

        tracing::info!(
            category = %category.id,
            count = missing.len(),
            "migrating missing classifications"
        );

        let outcome = run_batch(missing, self.max_concurrent, |row| async move {
            self.create_row(&row, category)
        })
        .await;
        Ok(outcome)
    }

    fn create_row(
        &self,
        source: &SourceClassification,
        category: &Category,
    ) -> Result<Classification, MigrateError> {
        let now = Utc::now();
        let classification = Classification {
            id: Uuid::new_v4().to_string(),
            source_ref: source.id,
            name: source.description.clone(),
            category_id: category.id.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_classification(&classification) {
            Ok(()) => {
                tracing::info!(
                    source_ref = source.id,
                    id = %classification.id,
                    "classification migrated"
                );
                Ok(classification)
            }
            Err(err) if err.is_unique_violation() => {
                self.store.classification_by_ref(source.id)?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }
}
