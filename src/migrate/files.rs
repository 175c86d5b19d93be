//! File payload migration
//!
//! Moving a file spans two resources with no shared transaction: the byte
//! store and the metadata store. The sequence is fetch, write, verify,
//! persist; any failure after the bytes land triggers a compensating delete
//! so a retry never finds orphaned payloads. Cleanup is best-effort — a
//! failed delete is logged and never masks the original error.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::content::ContentSink;
use crate::error::MigrateError;
use crate::fetch::{download_locator, PayloadFetcher};
use crate::migrate::batch::run_batch;
use crate::models::{FileAsset, SourceFile};
use crate::owner::{Owner, OwnerRef};
use crate::source::SourceDb;
use crate::store::TargetStore;

/// Aggregate result of a multi-file migration.
#[derive(Debug, Default)]
pub struct FileMigrationReport {
    pub migrated: Vec<FileAsset>,
    /// Source files skipped because they were already migrated.
    pub skipped: usize,
    pub failed: Vec<(SourceFile, MigrateError)>,
}

pub struct FileMigrator<'a, F, S> {
    source: &'a SourceDb,
    store: &'a TargetStore,
    content: &'a S,
    fetcher: &'a F,
    endpoint: &'a str,
    max_concurrent: usize,
}

impl<'a, F: PayloadFetcher, S: ContentSink> FileMigrator<'a, F, S> {
    pub fn new(
        source: &'a SourceDb,
        store: &'a TargetStore,
        content: &'a S,
        fetcher: &'a F,
        endpoint: &'a str,
        max_concurrent: usize,
    ) -> Self {
        Self {
            source,
            store,
            content,
            fetcher,
            endpoint,
            max_concurrent,
        }
    }

    /// Migrate the given source files, skipping those already present. An
    /// empty id set is a no-op success.
    pub async fn migrate_many(
        &self,
        source_file_ids: &[i64],
        owner: Option<&Owner>,
    ) -> Result<FileMigrationReport, MigrateError> {
        if source_file_ids.is_empty() {
            return Ok(FileMigrationReport::default());
        }

        let rows = self.source.files_by_ids(source_file_ids)?;
        let already: HashSet<i64> = self
            .store
            .file_refs_among(source_file_ids)?
            .into_iter()
            .collect();

        let (pending, skipped): (Vec<SourceFile>, Vec<SourceFile>) = rows
            .into_iter()
            .partition(|row| !already.contains(&row.id));
        let skipped = skipped.len();

        if pending.is_empty() {
            return Ok(FileMigrationReport {
                skipped,
                ..Default::default()
            });
        }

        tracing::info!(count = pending.len(), skipped, "transferring file payloads");
        let outcome = run_batch(pending, self.max_concurrent, |row| async move {
            self.transfer_one(&row, owner).await
        })
        .await;

        Ok(FileMigrationReport {
            migrated: outcome.succeeded,
            skipped,
            failed: outcome.failed,
        })
    }

    /// Transfer one file: fetch the payload, store it locally, verify the
    /// stored length, then persist the metadata record.
    pub async fn transfer_one(
        &self,
        source: &SourceFile,
        owner: Option<&Owner>,
    ) -> Result<FileAsset, MigrateError> {
        // Resolve the owner before moving any bytes; an unresolvable owner
        // fails the item without touching storage.
        let (owner_type, owner_id) = match owner {
            Some(o) => (
                o.kind().as_str().to_string(),
                o.key().ok_or(MigrateError::OwnerUnresolved)?,
            ),
            None => (source.owner_type.clone(), source.owner_id.to_string()),
        };

        let locator = download_locator(self.endpoint, &source.route);
        let bytes = self.fetcher.fetch(&locator).await?;

        let extension = file_extension(&source.filename);
        let rel = if extension.is_empty() {
            format!("migrated/{}-{}", source.id, Uuid::new_v4())
        } else {
            format!("migrated/{}-{}.{}", source.id, Uuid::new_v4(), extension)
        };

        self.content.write(&rel, &bytes)?;
        if let Err(err) = self.content.verify_len(&rel, bytes.len() as u64) {
            self.discard(&rel);
            return Err(err);
        }

        let asset = FileAsset {
            id: Uuid::new_v4().to_string(),
            owner_type,
            owner_id,
            path: rel.clone(),
            display_name: source.display_name.clone(),
            extension,
            source_ref: Some(source.id),
            created_at: Utc::now(),
        };

        match self.store.insert_file_asset(&asset) {
            Ok(()) => {
                tracing::info!(source_ref = source.id, path = %asset.path, "file migrated");
                Ok(asset)
            }
            Err(err) if err.is_unique_violation() => {
                // Another invocation won the race; its asset already points
                // at its own copy of the bytes, so ours are surplus.
                self.discard(&rel);
                self.store.file_by_ref(source.id)?.ok_or(err)
            }
            Err(err) => {
                self.discard(&rel);
                Err(err)
            }
        }
    }

    /// Compensating delete of stored bytes, best-effort.
    fn discard(&self, rel: &str) {
        if let Err(cleanup) = self.content.delete(rel) {
            tracing::error!(path = rel, error = %cleanup, "failed to discard stored payload");
        }
    }
}

/// Extension from the trailing segment after the last `.`, lowercased;
/// empty when the filename has none.
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("informe.PDF"), "pdf");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("sin_extension"), "");
        assert_eq!(file_extension("trailing."), "");
        assert_eq!(file_extension(""), "");
    }
}
