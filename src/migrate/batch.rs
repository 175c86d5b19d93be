//! Bounded concurrent fan-out for "migrate many" operations
//!
//! Every item settles independently: one item's failure never cancels or
//! blocks another's completion, and the aggregate outcome reports both
//! sides. Fan-out is capped — item operations are only constructed as
//! capacity frees up, so at most `max_concurrent` are in flight against the
//! stores at any moment. Completion order within a batch is unspecified.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::error::MigrateError;

/// Aggregate result of a batch run.
#[derive(Debug)]
pub struct BatchOutcome<T, R> {
    pub succeeded: Vec<R>,
    pub failed: Vec<(T, MigrateError)>,
}

impl<T, R> BatchOutcome<T, R> {
    pub fn empty() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn migrated(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failures(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<T, R> Default for BatchOutcome<T, R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Run `op` over every item with bounded concurrency, waiting for all of
/// them to settle.
pub async fn run_batch<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    op: F,
) -> BatchOutcome<T, R>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, MigrateError>>,
{
    let cap = max_concurrent.max(1);
    let op = &op;

    let settled: Vec<(T, Result<R, MigrateError>)> = stream::iter(items)
        .map(|item| async move {
            let result = op(item.clone()).await;
            (item, result)
        })
        .buffer_unordered(cap)
        .collect()
        .await;

    let mut outcome = BatchOutcome::empty();
    for (item, result) in settled {
        match result {
            Ok(value) => outcome.succeeded.push(value),
            Err(err) => {
                tracing::warn!(error = %err, "batch item failed");
                outcome.failed.push((item, err));
            }
        }
    }
    outcome
}
