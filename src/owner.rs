//! Polymorphic owner association
//!
//! Files and comments hang off an owning record through a `(type, id)` pair
//! with no foreign-key constraint. The owning side is expressed as a narrow
//! capability rather than a shared base type: anything that can produce a
//! stable type name and (maybe) a key can own attachments.
//!
//! The type names are persisted and later used for lookups, so they come
//! from a sealed enum of fixed constants, never from a display name.

use serde::{Deserialize, Serialize};

/// Sealed set of record kinds that can own files or comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Ticket,
    Category,
    Classification,
}

impl OwnerKind {
    /// Stable persisted name. Changing these values orphans existing rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Category => "category",
            Self::Classification => "classification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket" => Some(Self::Ticket),
            "category" => Some(Self::Category),
            "classification" => Some(Self::Classification),
            _ => None,
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability exposed by any record that can own files or comments.
pub trait OwnerRef {
    /// Local identifier of the owning record; `None` when the record has no
    /// key yet (migration cannot proceed in that case).
    fn key(&self) -> Option<String>;

    fn kind(&self) -> OwnerKind;
}

/// Plain owner descriptor for callers that override the owner instead of
/// passing the owning record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: String,
}

impl Owner {
    pub fn ticket(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Ticket,
            id: id.into(),
        }
    }
}

impl OwnerRef for Owner {
    fn key(&self) -> Option<String> {
        if self.id.is_empty() {
            None
        } else {
            Some(self.id.clone())
        }
    }

    fn kind(&self) -> OwnerKind {
        self.kind
    }
}
