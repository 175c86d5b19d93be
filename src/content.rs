//! Local content storage for migrated file payloads
//!
//! A byte-addressable store keyed by a path relative to a configured root.
//! Writes are durable once they return; `verify_len` re-reads the stored
//! length so the file migrator can compare it against the fetched payload
//! before persisting metadata.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::MigrateError;

/// Capability consumed by the file migrator: a byte-addressable store keyed
/// by relative path, durable once `write` returns.
pub trait ContentSink {
    fn write(&self, rel: &str, bytes: &[u8]) -> Result<(), MigrateError>;
    fn len(&self, rel: &str) -> Result<u64, MigrateError>;
    fn delete(&self, rel: &str) -> Result<(), MigrateError>;

    /// Compare the stored length against the expected payload length.
    /// Returns `IntegrityMismatch` on divergence; the caller decides on
    /// cleanup.
    fn verify_len(&self, rel: &str, expected: u64) -> Result<(), MigrateError> {
        let stored = self.len(rel)?;
        if stored != expected {
            return Err(MigrateError::IntegrityMismatch {
                path: rel.to_string(),
                fetched: expected,
                stored,
            });
        }
        Ok(())
    }
}

pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn init(&self) -> Result<(), MigrateError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative key to an absolute path under the root. Keys with
    /// parent components or absolute paths are rejected outright.
    fn resolve(&self, rel: &str) -> Result<PathBuf, MigrateError> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(MigrateError::InvalidPath(rel.to_string()));
        }
        for component in rel_path.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(MigrateError::InvalidPath(rel.to_string())),
            }
        }
        Ok(self.root.join(rel_path))
    }

    pub fn write(&self, rel: &str, bytes: &[u8]) -> Result<(), MigrateError> {
        let path = self.resolve(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    pub fn len(&self, rel: &str) -> Result<u64, MigrateError> {
        let path = self.resolve(rel)?;
        Ok(fs::metadata(&path)?.len())
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.resolve(rel).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn delete(&self, rel: &str) -> Result<(), MigrateError> {
        let path = self.resolve(rel)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// See [`ContentSink::verify_len`].
    pub fn verify_len(&self, rel: &str, expected: u64) -> Result<(), MigrateError> {
        ContentSink::verify_len(self, rel, expected)
    }
}

impl ContentSink for ContentStore {
    fn write(&self, rel: &str, bytes: &[u8]) -> Result<(), MigrateError> {
        ContentStore::write(self, rel, bytes)
    }

    fn len(&self, rel: &str) -> Result<u64, MigrateError> {
        ContentStore::len(self, rel)
    }

    fn delete(&self, rel: &str) -> Result<(), MigrateError> {
        ContentStore::delete(self, rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ContentStore) {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        store.init().unwrap();
        (temp, store)
    }

    #[test]
    fn test_write_len_delete() {
        let (_temp, store) = store();
        store.write("migrated/1-a.pdf", b"payload").unwrap();
        assert_eq!(store.len("migrated/1-a.pdf").unwrap(), 7);
        assert!(store.exists("migrated/1-a.pdf"));

        store.delete("migrated/1-a.pdf").unwrap();
        assert!(!store.exists("migrated/1-a.pdf"));
        // Deleting an absent key is a no-op
        store.delete("migrated/1-a.pdf").unwrap();
    }

    #[test]
    fn test_verify_len() {
        let (_temp, store) = store();
        store.write("f.bin", &[0u8; 1024]).unwrap();
        store.verify_len("f.bin", 1024).unwrap();

        let err = store.verify_len("f.bin", 1000).unwrap_err();
        match err {
            MigrateError::IntegrityMismatch {
                fetched, stored, ..
            } => {
                assert_eq!(fetched, 1000);
                assert_eq!(stored, 1024);
            }
            other => panic!("expected IntegrityMismatch, got {other}"),
        }
    }

    #[test]
    fn test_traversal_rejected() {
        let (_temp, store) = store();
        assert!(matches!(
            store.write("../escape.bin", b"x"),
            Err(MigrateError::InvalidPath(_))
        ));
        assert!(matches!(
            store.write("/etc/passwd", b"x"),
            Err(MigrateError::InvalidPath(_))
        ));
    }
}
