//! Record types for both sides of the migration
//!
//! Source records mirror rows in the legacy store and are never written
//! back. Target records are owned by this engine; their `source_ref` field
//! stores the originating legacy id and is the idempotency key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::owner::OwnerKind;

// ---------------------------------------------------------------------------
// Source records (read-only, legacy integer ids)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTicket {
    pub id: i64,
    pub classification_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub estimated_date: Option<DateTime<Utc>>,
    pub classification_date: Option<DateTime<Utc>>,
    pub issue_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceClassification {
    pub id: i64,
    pub description: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: i64,
    pub display_name: String,
    pub filename: String,
    /// Storage route inside the legacy system; opaque to this engine apart
    /// from being encoded into the download locator.
    pub route: String,
    pub owner_type: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceComment {
    pub id: i64,
    pub owner_type: String,
    pub owner_id: i64,
    pub author_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Target records (uuid string ids, source_ref back-links)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub source_ref: Option<i64>,
    pub classification_id: String,
    pub title: String,
    pub description: Option<String>,
    pub estimated_date: Option<DateTime<Utc>>,
    pub classification_date: Option<DateTime<Utc>>,
    pub issue_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub source_ref: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub id: String,
    pub source_ref: i64,
    pub name: String,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAsset {
    pub id: String,
    pub owner_type: String,
    pub owner_id: String,
    /// Path relative to the content storage root.
    pub path: String,
    pub display_name: String,
    /// Lowercased extension without the dot; empty when the source filename
    /// had none.
    pub extension: String,
    pub source_ref: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub owner_type: String,
    pub owner_id: String,
    pub author_id: Option<i64>,
    pub author_display_name: Option<String>,
    pub body: String,
    pub source_ref: i64,
    pub created_at: DateTime<Utc>,
}

impl crate::owner::OwnerRef for Ticket {
    fn key(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn kind(&self) -> OwnerKind {
        OwnerKind::Ticket
    }
}

/// Selection filter for batch ticket migration. All fields are optional and
/// combine with AND; an empty filter selects every source ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Source-side classification id.
    pub classification_id: Option<i64>,
    pub source_ticket_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Timestamp <-> SQL conversion (timestamps persist as RFC 3339 TEXT)
// ---------------------------------------------------------------------------

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn opt_ts_to_sql(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(ts_to_sql)
}

pub(crate) fn ts_from_sql(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn opt_ts_from_sql(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts_from_sql(idx, s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_sql_round_trip() {
        let now = Utc::now();
        let back = ts_from_sql(0, ts_to_sql(&now)).unwrap();
        assert_eq!(now, back);
        assert_eq!(opt_ts_from_sql(0, None).unwrap(), None);
    }

    #[test]
    fn test_bad_timestamp_is_conversion_failure() {
        assert!(ts_from_sql(0, "yesterday".into()).is_err());
    }
}
