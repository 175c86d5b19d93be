//! Comment migration
//!
//! Comments attach to a local owner through the polymorphic owner
//! capability; the caller resolves the owner, this migrator never infers
//! it. The comment text is the primary payload — a failed author lookup
//! falls back to a placeholder display name instead of failing the item.

use chrono::Utc;
use uuid::Uuid;

use crate::error::MigrateError;
use crate::migrate::batch::{run_batch, BatchOutcome};
use crate::models::{Comment, SourceComment};
use crate::owner::OwnerRef;
use crate::source::SourceDb;
use crate::store::TargetStore;

/// Display-name lookup for the actor who wrote a source comment.
pub trait ActorDirectory {
    fn display_name(&self, actor_id: i64) -> Result<Option<String>, MigrateError>;
}

/// Placeholder used when the actor cannot be resolved.
fn placeholder_name(actor_id: i64) -> String {
    format!("former user #{actor_id}")
}

pub struct CommentMigrator<'a> {
    source: &'a SourceDb,
    store: &'a TargetStore,
    max_concurrent: usize,
}

impl<'a> CommentMigrator<'a> {
    pub fn new(source: &'a SourceDb, store: &'a TargetStore, max_concurrent: usize) -> Self {
        Self {
            source,
            store,
            max_concurrent,
        }
    }

    /// Migrate one comment onto the given owner. Idempotent: an existing
    /// record with the same source reference is returned as-is.
    pub fn migrate_one(
        &self,
        source: &SourceComment,
        owner: &impl OwnerRef,
        actors: &impl ActorDirectory,
    ) -> Result<Comment, MigrateError> {
        if let Some(existing) = self.store.comment_by_ref(source.id)? {
            return Ok(existing);
        }

        let owner_id = owner.key().ok_or(MigrateError::OwnerUnresolved)?;

        let author_display_name = match actors.display_name(source.author_id) {
            Ok(Some(name)) => name,
            Ok(None) => placeholder_name(source.author_id),
            Err(err) => {
                tracing::warn!(
                    actor = source.author_id,
                    error = %err,
                    "actor lookup failed, using placeholder"
                );
                placeholder_name(source.author_id)
            }
        };

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            owner_type: owner.kind().as_str().to_string(),
            owner_id,
            author_id: Some(source.author_id),
            author_display_name: Some(author_display_name),
            body: source.body.clone(),
            source_ref: source.id,
            created_at: source.created_at,
        };

        match self.store.insert_comment(&comment) {
            Ok(()) => {
                tracing::debug!(source_ref = source.id, id = %comment.id, "comment migrated");
                Ok(comment)
            }
            Err(err) if err.is_unique_violation() => {
                self.store.comment_by_ref(source.id)?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Migrate every source comment under a source-side owner onto the
    /// given local owner. Rows are ordered by creation time before fan-out
    /// so the migrated conversation is stable even though completion order
    /// is not.
    pub async fn migrate_many_by_owner(
        &self,
        source_owner_type: &str,
        source_owner_id: i64,
        owner: &impl OwnerRef,
        actors: &impl ActorDirectory,
    ) -> Result<BatchOutcome<SourceComment, Comment>, MigrateError> {
        let rows = self
            .source
            .comments_by_owner(source_owner_type, source_owner_id)?;
        if rows.is_empty() {
            return Ok(BatchOutcome::empty());
        }

        tracing::info!(
            owner_type = source_owner_type,
            owner_id = source_owner_id,
            count = rows.len(),
            "migrating comments"
        );
        let outcome = run_batch(rows, self.max_concurrent, |row| async move {
            self.migrate_one(&row, owner, actors)
        })
        .await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_name_names_the_actor() {
        assert_eq!(placeholder_name(42), "former user #42");
    }
}
