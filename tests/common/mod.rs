//! Shared fixtures for integration tests
//!
//! Seeds a legacy SQLite database through short-lived write connections;
//! the engine side only ever sees it through the read-only `SourceDb`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tempfile::TempDir;

use ticketport::content::ContentStore;
use ticketport::source::SourceDb;
use ticketport::store::TargetStore;

const LEGACY_SCHEMA: &str = r#"
CREATE TABLE ticket_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL
);
CREATE TABLE ticket_subtypes (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    type_id INTEGER NOT NULL
);
CREATE TABLE tickets (
    id INTEGER PRIMARY KEY,
    subtype_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    estimated_date TEXT,
    classification_date TEXT,
    issue_number TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE attachments (
    id INTEGER PRIMARY KEY,
    display_name TEXT NOT NULL,
    filename TEXT NOT NULL,
    route TEXT NOT NULL,
    owner_type TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    owner_type TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
"#;

/// Test context holding both databases and a content root under one temp
/// directory.
pub struct Fixture {
    pub temp: TempDir,
    pub legacy_path: PathBuf,
    pub source: SourceDb,
    pub store: TargetStore,
    pub content: ContentStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_source_enabled(true)
    }

    pub fn with_source_enabled(enabled: bool) -> Self {
        let temp = TempDir::new().unwrap();
        let legacy_path = temp.path().join("legacy.db");
        {
            let conn = Connection::open(&legacy_path).unwrap();
            conn.execute_batch(LEGACY_SCHEMA).unwrap();
        }
        let source = SourceDb::open(&legacy_path, enabled).unwrap();
        let store = TargetStore::open(&temp.path().join("target.db")).unwrap();
        let content = ContentStore::new(&temp.path().join("content"));
        content.init().unwrap();
        Self {
            temp,
            legacy_path,
            source,
            store,
            content,
        }
    }

    /// Short-lived write connection to the legacy database. Committed
    /// changes are visible through the read-only handle immediately.
    pub fn legacy(&self) -> Connection {
        Connection::open(&self.legacy_path).unwrap()
    }

    pub fn seed_category(&self, id: i64, name: &str, label: &str) {
        self.legacy()
            .execute(
                "INSERT INTO ticket_types (id, name, description) VALUES (?1, ?2, ?3)",
                params![id, name, label],
            )
            .unwrap();
    }

    pub fn seed_classification(&self, id: i64, description: &str, category_id: i64) {
        self.legacy()
            .execute(
                "INSERT INTO ticket_subtypes (id, description, type_id) VALUES (?1, ?2, ?3)",
                params![id, description, category_id],
            )
            .unwrap();
    }

    pub fn seed_ticket(&self, id: i64, classification_id: i64, title: &str) {
        self.seed_ticket_at(id, classification_id, title, &Utc::now().to_rfc3339());
    }

    pub fn seed_ticket_at(&self, id: i64, classification_id: i64, title: &str, created_at: &str) {
        self.legacy()
            .execute(
                "INSERT INTO tickets
                    (id, subtype_id, title, description, issue_number, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id,
                    classification_id,
                    title,
                    format!("details for {title}"),
                    format!("ISS-{id}"),
                    created_at
                ],
            )
            .unwrap();
    }

    pub fn seed_attachment(
        &self,
        id: i64,
        display_name: &str,
        filename: &str,
        route: &str,
        owner_type: &str,
        owner_id: i64,
    ) {
        self.legacy()
            .execute(
                "INSERT INTO attachments
                    (id, display_name, filename, route, owner_type, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    display_name,
                    filename,
                    route,
                    owner_type,
                    owner_id,
                    Utc::now().to_rfc3339()
                ],
            )
            .unwrap();
    }

    pub fn seed_comment(
        &self,
        id: i64,
        owner_type: &str,
        owner_id: i64,
        author_id: i64,
        body: &str,
        created_at: &str,
    ) {
        self.legacy()
            .execute(
                "INSERT INTO comments (id, owner_type, owner_id, author_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, owner_type, owner_id, author_id, body, created_at],
            )
            .unwrap();
    }

    pub fn seed_user(&self, id: i64, name: &str) {
        self.legacy()
            .execute(
                "INSERT INTO users (id, name) VALUES (?1, ?2)",
                params![id, name],
            )
            .unwrap();
    }
}

/// Parse an RFC 3339 timestamp literal.
pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

/// Count regular files under a directory, recursively.
pub fn stored_file_count(root: &Path) -> usize {
    let mut count = 0;
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += stored_file_count(&path);
        } else {
            count += 1;
        }
    }
    count
}
