//! Target store for migrated records
//!
//! SQLite database owned by this engine. Schema changes go through the
//! versioned migration runner below. Every table that receives migrated
//! rows carries a UNIQUE index on `source_ref`; the index is the storage
//! backstop for the read-then-write idempotency gate, so a lost race
//! surfaces as a constraint violation instead of a duplicate row.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::MigrateError;
use crate::models::{
    opt_ts_from_sql, opt_ts_to_sql, ts_from_sql, ts_to_sql, Category, Classification, Comment,
    FileAsset, Ticket,
};

/// Target record kinds addressable by `(kind, source_ref)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Category,
    Classification,
    Ticket,
    FileAsset,
    Comment,
}

impl RecordKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Classification => "classifications",
            Self::Ticket => "tickets",
            Self::FileAsset => "file_assets",
            Self::Comment => "comments",
        }
    }

    pub const ALL: [RecordKind; 5] = [
        Self::Category,
        Self::Classification,
        Self::Ticket,
        Self::FileAsset,
        Self::Comment,
    ];
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// Upper bound on `?` placeholders per statement, under SQLite's
/// bound-variable limit by a wide margin.
const MAX_PARAMS_PER_QUERY: usize = 500;

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    source_ref INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_source_ref ON categories(source_ref);

CREATE TABLE IF NOT EXISTS classifications (
    id TEXT PRIMARY KEY,
    source_ref INTEGER NOT NULL,
    name TEXT NOT NULL,
    category_id TEXT NOT NULL REFERENCES categories(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_classifications_source_ref ON classifications(source_ref);
CREATE INDEX IF NOT EXISTS idx_classifications_category ON classifications(category_id);

CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    source_ref INTEGER,
    classification_id TEXT NOT NULL REFERENCES classifications(id),
    title TEXT NOT NULL,
    description TEXT,
    estimated_date TEXT,
    classification_date TEXT,
    issue_number TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_source_ref
    ON tickets(source_ref) WHERE source_ref IS NOT NULL;

CREATE TABLE IF NOT EXISTS file_assets (
    id TEXT PRIMARY KEY,
    owner_type TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    path TEXT NOT NULL,
    display_name TEXT NOT NULL,
    extension TEXT NOT NULL,
    source_ref INTEGER,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_assets_source_ref
    ON file_assets(source_ref) WHERE source_ref IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_file_assets_owner ON file_assets(owner_type, owner_id);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    owner_type TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    author_id INTEGER,
    author_display_name TEXT,
    body TEXT NOT NULL,
    source_ref INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_comments_source_ref ON comments(source_ref);
CREATE INDEX IF NOT EXISTS idx_comments_owner ON comments(owner_type, owner_id);
"#;

pub struct TargetStore {
    conn: Mutex<Connection>,
}

impl TargetStore {
    /// Open (or create) the target database and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, MigrateError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        if version < CURRENT_SCHEMA_VERSION {
            let tx = conn.unchecked_transaction()?;
            if version < 1 {
                tx.execute_batch(SCHEMA_V1)?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES ('schema_version', ?1)",
                params![CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            tx.commit()?;
            tracing::info!(
                from = version,
                to = CURRENT_SCHEMA_VERSION,
                "target schema migrated"
            );
        }
        Ok(())
    }

    /// Run a closure against the connection. Tests use this to stage
    /// schema-level faults.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, MigrateError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    // -----------------------------------------------------------------------
    // Reference resolution: the idempotency gate
    // -----------------------------------------------------------------------

    /// Local id of the target record derived from the given source row, or
    /// `None` when nothing has been migrated for it yet. An indexed read on
    /// the `source_ref` column; absence is the common case, never an error.
    /// The UNIQUE index on the same column is what turns a lost
    /// check-then-create race into a handled already-exists outcome instead
    /// of a duplicate.
    pub fn local_id(
        &self,
        kind: RecordKind,
        source_ref: i64,
    ) -> Result<Option<String>, MigrateError> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                &format!("SELECT id FROM {} WHERE source_ref = ?1", kind.table()),
                params![source_ref],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn is_migrated(&self, kind: RecordKind, source_ref: i64) -> Result<bool, MigrateError> {
        Ok(self.local_id(kind, source_ref)?.is_some())
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    pub fn insert_category(&self, category: &Category) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO categories (id, source_ref, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.id,
                category.source_ref,
                category.name,
                category.description,
                ts_to_sql(&category.created_at),
                ts_to_sql(&category.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn category_by_ref(&self, source_ref: i64) -> Result<Option<Category>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, source_ref, name, description, created_at, updated_at
                 FROM categories WHERE source_ref = ?1",
                params![source_ref],
                map_category,
            )
            .optional()?;
        Ok(row)
    }

    pub fn category(&self, id: &str) -> Result<Option<Category>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, source_ref, name, description, created_at, updated_at
                 FROM categories WHERE id = ?1",
                params![id],
                map_category,
            )
            .optional()?;
        Ok(row)
    }

    // -----------------------------------------------------------------------
    // Classifications
    // -----------------------------------------------------------------------

    pub fn insert_classification(
        &self,
        classification: &Classification,
    ) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO classifications
                 (id, source_ref, name, category_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                classification.id,
                classification.source_ref,
                classification.name,
                classification.category_id,
                ts_to_sql(&classification.created_at),
                ts_to_sql(&classification.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn classification_by_ref(
        &self,
        source_ref: i64,
    ) -> Result<Option<Classification>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, source_ref, name, category_id, created_at, updated_at
                 FROM classifications WHERE source_ref = ?1",
                params![source_ref],
                map_classification,
            )
            .optional()?;
        Ok(row)
    }

    /// Source refs of all classifications already migrated under a local
    /// category. One query feeds the bulk diff in the classification
    /// migrator.
    pub fn classification_refs_for_category(
        &self,
        category_id: &str,
    ) -> Result<Vec<i64>, MigrateError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT source_ref FROM classifications WHERE category_id = ?1")?;
        let rows = stmt.query_map(params![category_id], |row| row.get(0))?;
        let mut refs = Vec::new();
        for row in rows {
            refs.push(row?);
        }
        Ok(refs)
    }

    // -----------------------------------------------------------------------
    // Tickets
    // -----------------------------------------------------------------------

    pub fn insert_ticket(&self, ticket: &Ticket) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tickets
                 (id, source_ref, classification_id, title, description, estimated_date,
                  classification_date, issue_number, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                ticket.id,
                ticket.source_ref,
                ticket.classification_id,
                ticket.title,
                ticket.description,
                opt_ts_to_sql(&ticket.estimated_date),
                opt_ts_to_sql(&ticket.classification_date),
                ticket.issue_number,
                ts_to_sql(&ticket.created_at),
                ts_to_sql(&ticket.updated_at),
                opt_ts_to_sql(&ticket.deleted_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite the mutable fields of an existing ticket from a fresh
    /// source snapshot.
    pub fn update_ticket(&self, ticket: &Ticket) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE tickets SET
                 classification_id = ?2, title = ?3, description = ?4,
                 estimated_date = ?5, classification_date = ?6, issue_number = ?7,
                 updated_at = ?8
             WHERE id = ?1",
            params![
                ticket.id,
                ticket.classification_id,
                ticket.title,
                ticket.description,
                opt_ts_to_sql(&ticket.estimated_date),
                opt_ts_to_sql(&ticket.classification_date),
                ticket.issue_number,
                ts_to_sql(&ticket.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(MigrateError::TargetNotFound {
                kind: "ticket",
                id: ticket.id.clone(),
            });
        }
        Ok(())
    }

    pub fn ticket(&self, id: &str) -> Result<Option<Ticket>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_TICKET),
                params![id],
                map_ticket,
            )
            .optional()?;
        Ok(row)
    }

    pub fn ticket_by_ref(&self, source_ref: i64) -> Result<Option<Ticket>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{} WHERE source_ref = ?1", SELECT_TICKET),
                params![source_ref],
                map_ticket,
            )
            .optional()?;
        Ok(row)
    }

    /// Source refs of every migrated ticket, for the batch anti-join.
    pub fn ticket_refs(&self) -> Result<Vec<i64>, MigrateError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT source_ref FROM tickets WHERE source_ref IS NOT NULL")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut refs = Vec::new();
        for row in rows {
            refs.push(row?);
        }
        Ok(refs)
    }

    // -----------------------------------------------------------------------
    // File assets
    // -----------------------------------------------------------------------

    pub fn insert_file_asset(&self, asset: &FileAsset) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO file_assets
                 (id, owner_type, owner_id, path, display_name, extension, source_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                asset.id,
                asset.owner_type,
                asset.owner_id,
                asset.path,
                asset.display_name,
                asset.extension,
                asset.source_ref,
                ts_to_sql(&asset.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn file_by_ref(&self, source_ref: i64) -> Result<Option<FileAsset>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, owner_type, owner_id, path, display_name, extension,
                        source_ref, created_at
                 FROM file_assets WHERE source_ref = ?1",
                params![source_ref],
                map_file_asset,
            )
            .optional()?;
        Ok(row)
    }

    /// Which of the given source file ids are already migrated. The id list
    /// is queried in chunks so it can exceed SQLite's bound-variable limit.
    pub fn file_refs_among(&self, ids: &[i64]) -> Result<Vec<i64>, MigrateError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut refs = Vec::new();
        for chunk in ids.chunks(MAX_PARAMS_PER_QUERY) {
            let sql = format!(
                "SELECT source_ref FROM file_assets WHERE source_ref IN ({})",
                vec!["?"; chunk.len()].join(",")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get(0))?;
            for row in rows {
                refs.push(row?);
            }
        }
        Ok(refs)
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    pub fn insert_comment(&self, comment: &Comment) -> Result<(), MigrateError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO comments
                 (id, owner_type, owner_id, author_id, author_display_name, body,
                  source_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                comment.id,
                comment.owner_type,
                comment.owner_id,
                comment.author_id,
                comment.author_display_name,
                comment.body,
                comment.source_ref,
                ts_to_sql(&comment.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn comment_by_ref(&self, source_ref: i64) -> Result<Option<Comment>, MigrateError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, owner_type, owner_id, author_id, author_display_name, body,
                        source_ref, created_at
                 FROM comments WHERE source_ref = ?1",
                params![source_ref],
                map_comment,
            )
            .optional()?;
        Ok(row)
    }

    pub fn comments_by_owner(
        &self,
        owner_type: &str,
        owner_id: &str,
    ) -> Result<Vec<Comment>, MigrateError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_type, owner_id, author_id, author_display_name, body,
                    source_ref, created_at
             FROM comments WHERE owner_type = ?1 AND owner_id = ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![owner_type, owner_id], map_comment)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    // -----------------------------------------------------------------------
    // Counts (reconciliation reporter)
    // -----------------------------------------------------------------------

    pub fn count(&self, kind: RecordKind) -> Result<u64, MigrateError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_with_ref(&self, kind: RecordKind) -> Result<u64, MigrateError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE source_ref IS NOT NULL",
                kind.table()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

const SELECT_TICKET: &str = "SELECT id, source_ref, classification_id, title, description,
        estimated_date, classification_date, issue_number, created_at, updated_at, deleted_at
 FROM tickets";

fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        source_ref: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: ts_from_sql(4, row.get(4)?)?,
        updated_at: ts_from_sql(5, row.get(5)?)?,
    })
}

fn map_classification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Classification> {
    Ok(Classification {
        id: row.get(0)?,
        source_ref: row.get(1)?,
        name: row.get(2)?,
        category_id: row.get(3)?,
        created_at: ts_from_sql(4, row.get(4)?)?,
        updated_at: ts_from_sql(5, row.get(5)?)?,
    })
}

fn map_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        source_ref: row.get(1)?,
        classification_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        estimated_date: opt_ts_from_sql(5, row.get(5)?)?,
        classification_date: opt_ts_from_sql(6, row.get(6)?)?,
        issue_number: row.get(7)?,
        created_at: ts_from_sql(8, row.get(8)?)?,
        updated_at: ts_from_sql(9, row.get(9)?)?,
        deleted_at: opt_ts_from_sql(10, row.get(10)?)?,
    })
}

fn map_file_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileAsset> {
    Ok(FileAsset {
        id: row.get(0)?,
        owner_type: row.get(1)?,
        owner_id: row.get(2)?,
        path: row.get(3)?,
        display_name: row.get(4)?,
        extension: row.get(5)?,
        source_ref: row.get(6)?,
        created_at: ts_from_sql(7, row.get(7)?)?,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        owner_type: row.get(1)?,
        owner_id: row.get(2)?,
        author_id: row.get(3)?,
        author_display_name: row.get(4)?,
        body: row.get(5)?,
        source_ref: row.get(6)?,
        created_at: ts_from_sql(7, row.get(7)?)?,
    })
}
