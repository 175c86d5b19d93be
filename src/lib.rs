//! Ticketport — legacy helpdesk migration and reconciliation engine
//!
//! Copies ticket, classification, file, and comment records from a
//! read-only legacy store into the local canonical store. Never duplicates
//! a record (every target row keeps the originating source id behind a
//! unique index), resolves missing dependency chains by cascading creation
//! (ticket -> classification -> category), and transfers file payloads with
//! length verification and compensating cleanup on partial failure.

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod migrate;
pub mod models;
pub mod owner;
pub mod source;
pub mod store;

pub use engine::MigrationEngine;
pub use error::MigrateError;
