//! Error taxonomy for the migration engine
//!
//! Expected outcomes (a record is already migrated, a lookup finds nothing)
//! are not errors; they are surfaced through result enums on the individual
//! migrators. Everything here represents a failure the caller has to act on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The source connectivity flag is off; nothing was attempted.
    #[error("source connection is disabled")]
    SourceDisabled,

    /// A referenced source row does not exist upstream.
    #[error("source {kind} {id} not found")]
    SourceNotFound { kind: &'static str, id: i64 },

    /// A local record that the operation needs is missing.
    #[error("local {kind} {id} not found")]
    TargetNotFound { kind: &'static str, id: String },

    /// A required parent record could not be created.
    #[error("cannot resolve {kind} dependency (source id {id}): {reason}")]
    DependencyUnresolvable {
        kind: &'static str,
        id: i64,
        reason: String,
    },

    /// Fetching file bytes failed (network error, timeout, non-success status).
    /// Retryable by the caller; never retried internally.
    #[error("transfer failed for {locator}: {reason}")]
    TransferFailure { locator: String, reason: String },

    /// The stored payload length does not match the fetched payload length.
    /// The stored bytes have already been discarded when this is returned.
    #[error("integrity mismatch for {path}: fetched {fetched} bytes, stored {stored}")]
    IntegrityMismatch {
        path: String,
        fetched: u64,
        stored: u64,
    },

    /// A polymorphic owner was supplied without a key.
    #[error("owner reference has no key")]
    OwnerUnresolved,

    /// A local record has no stored source reference to refresh from.
    #[error("local {kind} {id} has no source reference")]
    NotLinked { kind: &'static str, id: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Whether the underlying database error is a UNIQUE constraint violation.
    ///
    /// Insert paths treat a uniqueness violation on `source_ref` as the
    /// already-migrated outcome rather than a failure, which closes the
    /// read-then-write race between concurrent invocations for the same
    /// source id.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlite(e) => is_unique_violation(e),
            _ => false,
        }
    }
}

/// Check a raw rusqlite error for a UNIQUE constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_ids() {
        let err = MigrateError::SourceNotFound {
            kind: "ticket",
            id: 42,
        };
        assert_eq!(err.to_string(), "source ticket 42 not found");

        let err = MigrateError::IntegrityMismatch {
            path: "migrated/7-x.pdf".into(),
            fetched: 1024,
            stored: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn test_unique_violation_detection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .expect_err("duplicate insert must fail");
        assert!(is_unique_violation(&err));
        assert!(MigrateError::from(err).is_unique_violation());
    }

    #[test]
    fn test_non_constraint_errors_are_not_unique_violations() {
        assert!(!MigrateError::SourceDisabled.is_unique_violation());
        assert!(!MigrateError::OwnerUnresolved.is_unique_violation());
    }
}
