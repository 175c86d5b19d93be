//! Migration operations
//!
//! One submodule per entity migrator plus the shared batch runner and the
//! reconciliation reporter. All migrators are thin, borrow the two stores,
//! and check the `source_ref` idempotency gate before creating anything.

pub mod batch;
pub mod category;
pub mod classification;
pub mod comments;
pub mod files;
pub mod report;
pub mod ticket;
