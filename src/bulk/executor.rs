use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::Error;
use crate::bulk::retry::jittered_delay;
use crate::config::duration_ms;
use crate::store::{
    BATCH_GET_LIMIT, BATCH_WRITE_LIMIT, StoreClient, TRANSACT_ITEMS_LIMIT, TransactGetInput,
    TransactGetOp, TransactGetOutput, TransactWriteInput, TransactWriteOp, TransactWriteOutput,
};

/// Chunking, retry and concurrency settings
///
/// Chunk sizes above the store ceilings (100 reads, 25 writes) are clamped,
/// zero is treated as one. Backoff base and cap are per table because
/// throughput classes differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Keys per `BatchGetItem` call
    pub read_chunk_size: usize,
    /// Requests per `BatchWriteItem` call
    pub write_chunk_size: usize,
    /// Rounds per batch call, and calls per transaction, first one included
    pub max_attempts: usize,
    /// Backoff before the first retry
    #[serde(with = "duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Chunks in flight at once within a round
    pub concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: BATCH_GET_LIMIT,
            write_chunk_size: BATCH_WRITE_LIMIT,
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            concurrency: 10,
        }
    }
}

impl BulkConfig {
    pub(crate) fn read_chunk(&self) -> usize {
        self.read_chunk_size.clamp(1, BATCH_GET_LIMIT)
    }

    pub(crate) fn write_chunk(&self) -> usize {
        self.write_chunk_size.clamp(1, BATCH_WRITE_LIMIT)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    pub(crate) fn concurrency_for(&self, chunks: usize) -> usize {
        chunks.min(self.concurrency).max(1)
    }

    pub(crate) fn backoff(&self, retry: usize) -> Duration {
        jittered_delay(retry, self.base_delay, self.max_delay)
    }
}

/// Store-legal batch and transaction calls with retry
///
/// Batch calls run as sequential rounds: every chunk of a round is in
/// flight concurrently, and whatever the store leaves unprocessed is
/// resubmitted as the next round after a jittered backoff.
#[derive(Clone, Copy, Debug, Default)]
pub struct BulkExecutor {
    pub(crate) config: BulkConfig,
}

impl BulkExecutor {
    /// Executor with the given settings
    pub fn new(config: BulkConfig) -> Self {
        Self { config }
    }

    /// Settings in use
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// All-or-nothing write of at most 100 items
    ///
    /// Throttling and timeouts are retried with the same request token.
    /// Cancellations and conditional failures are returned immediately.
    pub async fn transact_write<C: StoreClient>(
        &self,
        client: &C,
        items: Vec<TransactWriteOp>,
        client_request_token: Option<String>,
    ) -> Result<TransactWriteOutput, Error> {
        check_transaction_size(items.len())?;

        let attempts = self.config.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let input = TransactWriteInput {
                items: items.clone(),
                client_request_token: client_request_token.clone(),
            };
            match client.transact_write_items(input).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, items = items.len(), error = %err, "retrying write transaction");
                    sleep(self.config.backoff(attempt - 1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// All-or-nothing read of at most 100 items, results in request order
    pub async fn transact_get<C: StoreClient>(
        &self,
        client: &C,
        items: Vec<TransactGetOp>,
    ) -> Result<TransactGetOutput, Error> {
        check_transaction_size(items.len())?;

        let attempts = self.config.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let input = TransactGetInput {
                items: items.clone(),
            };
            match client.transact_get_items(input).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, items = items.len(), error = %err, "retrying read transaction");
                    sleep(self.config.backoff(attempt - 1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn check_transaction_size(len: usize) -> Result<(), Error> {
    if len == 0 {
        return Err(Error::validation("a transaction needs at least one item"));
    }
    if len > TRANSACT_ITEMS_LIMIT {
        return Err(Error::validation(format!(
            "a transaction holds at most {TRANSACT_ITEMS_LIMIT} items, got {len}"
        )));
    }
    Ok(())
}
