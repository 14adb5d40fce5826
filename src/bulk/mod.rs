//! Batch and transaction execution within the store's per-call limits.
//!
//! Batch reads are split into chunks of at most 100 keys, batch writes into
//! chunks of at most 25 requests. Whatever the store reports as unprocessed
//! is retried with exponential backoff until `max_attempts` rounds have run.
//! Transactions are never split.

mod batch;
mod executor;
mod retry;

pub use batch::{BatchGetOutput, BatchWriteOutput};
pub use executor::{BulkConfig, BulkExecutor};
