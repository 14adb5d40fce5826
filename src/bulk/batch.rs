use futures_util::{StreamExt, TryStreamExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_stream::{self as stream};

use crate::Error;
use crate::bulk::executor::BulkExecutor;
use crate::store::{
    BatchGetChunkOutput, BatchGetInput, BatchWriteChunkOutput, BatchWriteInput, Capacity, Item,
    StoreClient, WriteOp,
};

/// Batch read output with the keys that stayed unprocessed
#[must_use = "batch read results contain failed keys that should be checked"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found, in no particular order
    pub items: Vec<Item>,
    /// Keys still unprocessed after the last round
    pub failed_keys: Vec<Item>,
    /// Rounds run, first one included (0 for an empty request)
    pub attempts: usize,
    /// Total execution time including backoff
    pub total_duration: Duration,
    /// Capacity consumed over all rounds
    pub consumed: Capacity,
}

impl BatchGetOutput {
    /// Check if every key was processed
    pub fn is_success(&self) -> bool {
        self.failed_keys.is_empty()
    }

    /// Number of retry rounds
    pub fn retry_count(&self) -> usize {
        self.attempts.saturating_sub(1)
    }

    /// Get success rate as a percentage (0.0 to 100.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.items.len() + self.failed_keys.len();
        if total == 0 {
            return 100.0;
        }
        (self.items.len() as f64 / total as f64) * 100.0
    }
}

/// Batch write output, split into processed and failed requests
#[must_use = "batch write results contain failed requests that should be checked"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteOutput {
    /// Requests the store applied
    pub processed: Vec<WriteOp>,
    /// Requests still unprocessed after the last round
    pub failed: Vec<WriteOp>,
    /// Rounds run, first one included (0 for an empty request)
    pub attempts: usize,
    /// Total execution time including backoff
    pub total_duration: Duration,
    /// Capacity consumed over all rounds
    pub consumed: Capacity,
}

impl BatchWriteOutput {
    /// Check if every request was applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of retry rounds
    pub fn retry_count(&self) -> usize {
        self.attempts.saturating_sub(1)
    }

    /// Get total number of requests processed successfully
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Get total number of requests that failed
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Get success rate as a percentage (0.0 to 100.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.processed_count() + self.failed_count();
        if total == 0 {
            return 100.0;
        }
        (self.processed_count() as f64 / total as f64) * 100.0
    }
}

/// Result of one chunk within a round
enum ChunkOutcome<O, U> {
    /// The call returned; some of the chunk may still be unprocessed
    Returned { submitted: Vec<U>, output: O },
    /// The call failed transiently; the whole chunk goes to the next round
    Retry(Vec<U>),
}

/// Submit one chunk, turning retryable failures into a full requeue
async fn submit<U, O, F>(submitted: Vec<U>, call: F) -> Result<ChunkOutcome<O, U>, Error>
where
    U: Clone,
    F: Future<Output = Result<O, Error>>,
{
    match call.await {
        Ok(output) => Ok(ChunkOutcome::Returned { submitted, output }),
        Err(err) if err.is_retryable() => {
            tracing::debug!(chunk = submitted.len(), error = %err, "chunk failed transiently");
            Ok(ChunkOutcome::Retry(submitted))
        }
        Err(err) => Err(err),
    }
}

#[derive(Default)]
struct GetRound {
    items: Vec<Item>,
    unprocessed: Vec<Item>,
    consumed: Capacity,
}

#[derive(Default)]
struct WriteRound {
    processed: Vec<WriteOp>,
    unprocessed: Vec<WriteOp>,
    consumed: Capacity,
}

/// Requests of `submitted` that are not in `unprocessed`
fn applied(mut submitted: Vec<WriteOp>, unprocessed: &[WriteOp]) -> Vec<WriteOp> {
    for op in unprocessed {
        if let Some(position) = submitted.iter().position(|s| s == op) {
            let _ = submitted.remove(position);
        }
    }
    submitted
}

impl BulkExecutor {
    /// Read any number of keys from one table
    ///
    /// Issues `ceil(N / read_chunk_size)` calls in the first round. Keys the
    /// store leaves unprocessed, or whose chunk was throttled, are retried
    /// for up to `max_attempts` rounds and then returned in `failed_keys`.
    /// Non-retryable store errors abort the whole call.
    pub async fn batch_get<C: StoreClient>(
        &self,
        client: &C,
        table_name: &str,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> Result<BatchGetOutput, Error> {
        let start_time = Instant::now();
        let chunk_size = self.config.read_chunk();
        let attempts = self.config.attempts();

        let mut output = BatchGetOutput::default();
        let mut pending = keys;

        while !pending.is_empty() && output.attempts < attempts {
            if output.attempts > 0 {
                sleep(self.config.backoff(output.attempts - 1)).await;
            }
            output.attempts += 1;

            let chunks: Vec<Vec<Item>> = pending.chunks(chunk_size).map(<[Item]>::to_vec).collect();
            let calls = chunks.len();
            let concurrency = self.config.concurrency_for(calls);

            let round = stream::iter(chunks.into_iter().map(|chunk| {
                let input = BatchGetInput {
                    table_name: table_name.to_string(),
                    keys: chunk.clone(),
                    consistent_read,
                };
                submit(chunk, client.batch_get_item(input))
            }))
            .buffer_unordered(concurrency)
            .try_fold(GetRound::default(), |mut round, outcome| async move {
                match outcome {
                    ChunkOutcome::Returned {
                        output:
                            BatchGetChunkOutput {
                                items,
                                unprocessed_keys,
                                consumed,
                            },
                        ..
                    } => {
                        round.items.extend(items);
                        round.unprocessed.extend(unprocessed_keys);
                        round.consumed += consumed;
                    }
                    ChunkOutcome::Retry(keys) => round.unprocessed.extend(keys),
                }
                Ok(round)
            })
            .await?;

            tracing::debug!(
                table = table_name,
                attempt = output.attempts,
                calls,
                items = round.items.len(),
                unprocessed = round.unprocessed.len(),
                "batch get round finished"
            );

            output.items.extend(round.items);
            output.consumed += round.consumed;
            pending = round.unprocessed;
        }

        if !pending.is_empty() {
            tracing::warn!(
                table = table_name,
                failed = pending.len(),
                attempts = output.attempts,
                "batch get left keys unprocessed"
            );
        }

        output.failed_keys = pending;
        output.total_duration = start_time.elapsed();
        Ok(output)
    }

    /// Put and delete any number of items in one table
    ///
    /// Issues `ceil(N / write_chunk_size)` calls in the first round and
    /// retries like [`BulkExecutor::batch_get`]. Requests are reported as
    /// processed only once the store has accepted them.
    pub async fn batch_write<C: StoreClient>(
        &self,
        client: &C,
        table_name: &str,
        requests: Vec<WriteOp>,
    ) -> Result<BatchWriteOutput, Error> {
        let start_time = Instant::now();
        let chunk_size = self.config.write_chunk();
        let attempts = self.config.attempts();

        let mut output = BatchWriteOutput::default();
        let mut pending = requests;

        while !pending.is_empty() && output.attempts < attempts {
            if output.attempts > 0 {
                sleep(self.config.backoff(output.attempts - 1)).await;
            }
            output.attempts += 1;

            let chunks: Vec<Vec<WriteOp>> =
                pending.chunks(chunk_size).map(<[WriteOp]>::to_vec).collect();
            let calls = chunks.len();
            let concurrency = self.config.concurrency_for(calls);

            let round = stream::iter(chunks.into_iter().map(|chunk| {
                let input = BatchWriteInput {
                    table_name: table_name.to_string(),
                    requests: chunk.clone(),
                };
                submit(chunk, client.batch_write_item(input))
            }))
            .buffer_unordered(concurrency)
            .try_fold(WriteRound::default(), |mut round, outcome| async move {
                match outcome {
                    ChunkOutcome::Returned {
                        submitted,
                        output:
                            BatchWriteChunkOutput {
                                unprocessed,
                                consumed,
                            },
                    } => {
                        round.processed.extend(applied(submitted, &unprocessed));
                        round.unprocessed.extend(unprocessed);
                        round.consumed += consumed;
                    }
                    ChunkOutcome::Retry(requests) => round.unprocessed.extend(requests),
                }
                Ok(round)
            })
            .await?;

            tracing::debug!(
                table = table_name,
                attempt = output.attempts,
                calls,
                processed = round.processed.len(),
                unprocessed = round.unprocessed.len(),
                "batch write round finished"
            );

            output.processed.extend(round.processed);
            output.consumed += round.consumed;
            pending = round.unprocessed;
        }

        if !pending.is_empty() {
            tracing::warn!(
                table = table_name,
                failed = pending.len(),
                attempts = output.attempts,
                "batch write left requests unprocessed"
            );
        }

        output.failed = pending;
        output.total_duration = start_time.elapsed();
        Ok(output)
    }
}
