//! Read-only access to the legacy store
//!
//! The legacy database is opened with SQLite's read-only flag; nothing in
//! this engine ever writes to it. When the configured connectivity gate is
//! switched off the database is never opened at all and every read fails
//! fast with `SourceDisabled`.
//!
//! Legacy schema notes: ticket categories live in `ticket_types`,
//! classifications in `ticket_subtypes`, and the type table keeps the
//! human-facing label in its `description` column.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, ToSql};

use crate::error::MigrateError;
use crate::models::{
    opt_ts_from_sql, ts_from_sql, ts_to_sql, SourceCategory, SourceClassification, SourceComment,
    SourceFile, SourceTicket, TicketFilter,
};
use crate::store::RecordKind;

/// Upper bound on `?` placeholders per statement, under SQLite's
/// bound-variable limit by a wide margin.
const MAX_PARAMS_PER_QUERY: usize = 500;

pub struct SourceDb {
    /// `None` when the connectivity gate is disabled; the legacy database
    /// is never touched in that case.
    conn: Option<Mutex<Connection>>,
}

impl SourceDb {
    /// Open the legacy database read-only. With the gate disabled no
    /// connection is attempted; every query then fails fast through the
    /// gate.
    pub fn open(path: &Path, enabled: bool) -> Result<Self, MigrateError> {
        let conn = if enabled {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            Some(Mutex::new(conn))
        } else {
            None
        };
        Ok(Self { conn })
    }

    fn gate(&self) -> Result<&Mutex<Connection>, MigrateError> {
        self.conn.as_ref().ok_or(MigrateError::SourceDisabled)
    }

    pub fn ticket(&self, id: i64) -> Result<Option<SourceTicket>, MigrateError> {
        let conn = self.gate()?.lock();
        let row = conn
            .query_row(
                "SELECT id, subtype_id, title, description, estimated_date,
                        classification_date, issue_number, created_at, updated_at
                 FROM tickets WHERE id = ?1",
                params![id],
                map_ticket,
            )
            .optional()?;
        Ok(row)
    }

    /// Fetch source tickets matching the filter, excluding ids already
    /// present locally. The exclusion list comes from a single bulk query on
    /// the target side and scales with the target store, so it is applied in
    /// memory after the filtered read rather than through an IN list that
    /// would hit SQLite's bound-variable limit.
    pub fn tickets_matching(
        &self,
        filter: &TicketFilter,
        exclude_ids: &[i64],
    ) -> Result<Vec<SourceTicket>, MigrateError> {
        let conn = self.gate()?;

        let mut sql = String::from(
            "SELECT id, subtype_id, title, description, estimated_date,
                    classification_date, issue_number, created_at, updated_at
             FROM tickets WHERE 1=1",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(id) = filter.source_ticket_id {
            sql.push_str(" AND id = ?");
            args.push(Box::new(id));
        }
        if let Some(classification_id) = filter.classification_id {
            sql.push_str(" AND subtype_id = ?");
            args.push(Box::new(classification_id));
        }
        if let Some(from) = &filter.date_from {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(ts_to_sql(from)));
        }
        if let Some(to) = &filter.date_to {
            sql.push_str(" AND created_at <= ?");
            args.push(Box::new(ts_to_sql(to)));
        }
        sql.push_str(" ORDER BY id");

        let exclude: HashSet<i64> = exclude_ids.iter().copied().collect();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), map_ticket)?;
        let mut tickets = Vec::new();
        for row in rows {
            let ticket = row?;
            if !exclude.contains(&ticket.id) {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    pub fn classification(&self, id: i64) -> Result<Option<SourceClassification>, MigrateError> {
        let conn = self.gate()?.lock();
        let row = conn
            .query_row(
                "SELECT id, description, type_id FROM ticket_subtypes WHERE id = ?1",
                params![id],
                map_classification,
            )
            .optional()?;
        Ok(row)
    }

    pub fn classifications_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<SourceClassification>, MigrateError> {
        let conn = self.gate()?.lock();
        let mut stmt = conn.prepare(
            "SELECT id, description, type_id FROM ticket_subtypes
             WHERE type_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![category_id], map_classification)?;
        let mut classifications = Vec::new();
        for row in rows {
            classifications.push(row?);
        }
        Ok(classifications)
    }

    pub fn category(&self, id: i64) -> Result<Option<SourceCategory>, MigrateError> {
        let conn = self.gate()?.lock();
        let row = conn
            .query_row(
                "SELECT id, name, description FROM ticket_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SourceCategory {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Attachment rows for the given ids, in id order. The id list is
    /// queried in chunks so it can exceed SQLite's bound-variable limit.
    pub fn files_by_ids(&self, ids: &[i64]) -> Result<Vec<SourceFile>, MigrateError> {
        let conn = self.gate()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = conn.lock();
        let mut files = Vec::new();
        for chunk in ids.chunks(MAX_PARAMS_PER_QUERY) {
            let sql = format!(
                "SELECT id, display_name, filename, route, owner_type, owner_id, created_at
                 FROM attachments WHERE id IN ({})",
                vec!["?"; chunk.len()].join(",")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok(SourceFile {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    filename: row.get(2)?,
                    route: row.get(3)?,
                    owner_type: row.get(4)?,
                    owner_id: row.get(5)?,
                    created_at: ts_from_sql(6, row.get(6)?)?,
                })
            })?;
            for row in rows {
                files.push(row?);
            }
        }
        files.sort_by_key(|file| file.id);
        Ok(files)
    }

    /// Comments for a source-side owner, oldest first so the migrated
    /// conversation keeps its order.
    pub fn comments_by_owner(
        &self,
        owner_type: &str,
        owner_id: i64,
    ) -> Result<Vec<SourceComment>, MigrateError> {
        let conn = self.gate()?.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_type, owner_id, author_id, body, created_at
             FROM comments WHERE owner_type = ?1 AND owner_id = ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![owner_type, owner_id], |row| {
            Ok(SourceComment {
                id: row.get(0)?,
                owner_type: row.get(1)?,
                owner_id: row.get(2)?,
                author_id: row.get(3)?,
                body: row.get(4)?,
                created_at: ts_from_sql(5, row.get(5)?)?,
            })
        })?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    pub fn actor_name(&self, actor_id: i64) -> Result<Option<String>, MigrateError> {
        let conn = self.gate()?.lock();
        let name = conn
            .query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![actor_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Total source rows for a record kind, for reconciliation reporting.
    pub fn count(&self, kind: RecordKind) -> Result<u64, MigrateError> {
        let conn = self.gate()?;
        let table = match kind {
            RecordKind::Category => "ticket_types",
            RecordKind::Classification => "ticket_subtypes",
            RecordKind::Ticket => "tickets",
            RecordKind::FileAsset => "attachments",
            RecordKind::Comment => "comments",
        };
        let conn = conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }
}

fn map_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceTicket> {
    Ok(SourceTicket {
        id: row.get(0)?,
        classification_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        estimated_date: opt_ts_from_sql(4, row.get(4)?)?,
        classification_date: opt_ts_from_sql(5, row.get(5)?)?,
        issue_number: row.get(6)?,
        created_at: ts_from_sql(7, row.get(7)?)?,
        updated_at: ts_from_sql(8, row.get(8)?)?,
    })
}

fn map_classification(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceClassification> {
    Ok(SourceClassification {
        id: row.get(0)?,
        description: row.get(1)?,
        category_id: row.get(2)?,
    })
}

impl crate::migrate::comments::ActorDirectory for SourceDb {
    fn display_name(&self, actor_id: i64) -> Result<Option<String>, MigrateError> {
        self.actor_name(actor_id)
    }
}
