//! Category migration
//!
//! Leaf of the dependency chain: classifications hang off categories, so
//! every cascade bottoms out here. A category that is missing upstream is
//! fatal to the caller's cascade — there is nothing to invent one from.

use chrono::Utc;
use uuid::Uuid;

use crate::error::MigrateError;
use crate::models::Category;
use crate::source::SourceDb;
use crate::store::TargetStore;

pub struct CategoryMigrator<'a> {
    source: &'a SourceDb,
    store: &'a TargetStore,
}

impl<'a> CategoryMigrator<'a> {
    pub fn new(source: &'a SourceDb, store: &'a TargetStore) -> Self {
        Self { source, store }
    }

    /// Ensure a local category exists for the given source category id,
    /// creating it from the source row if absent.
    pub fn ensure(&self, source_category_id: i64) -> Result<Category, MigrateError> {
        if let Some(existing) = self.store.category_by_ref(source_category_id)? {
            return Ok(existing);
        }

        let source = self.source.category(source_category_id)?.ok_or(
            MigrateError::SourceNotFound {
                kind: "category",
                id: source_category_id,
            },
        )?;

        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4().to_string(),
            source_ref: source.id,
            // The legacy type table keeps the human-facing label in its
            // description column.
            name: source.description,
            description: source.name,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_category(&category) {
            Ok(()) => {
                tracing::info!(source_ref = source_category_id, id = %category.id, "category migrated");
                Ok(category)
            }
            Err(err) if err.is_unique_violation() => {
                // Lost the race to a concurrent invocation; the winner's row
                // is the canonical one.
                self.store
                    .category_by_ref(source_category_id)?
                    .ok_or(err)
            }
            Err(err) => Err(err),
        }
    }
}
