use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::Error;
use crate::store::Capacity;

/// Kind of store operation an [`OperationRecord`] describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Single item read
    Get,
    /// Single item put
    Put,
    /// Single item update
    Update,
    /// Single item delete
    Delete,
    /// Query, including pattern executions
    Query,
    /// Full table or index scan
    Scan,
    /// Chunked batch read
    BatchGet,
    /// Chunked batch write
    BatchWrite,
    /// Write transaction
    TransactWrite,
    /// Read transaction
    TransactGet,
}

impl OperationKind {
    /// Stable snake case name
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Put => "put",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Query => "query",
            OperationKind::Scan => "scan",
            OperationKind::BatchGet => "batch_get",
            OperationKind::BatchWrite => "batch_write",
            OperationKind::TransactWrite => "transact_write",
            OperationKind::TransactGet => "transact_get",
        }
    }

    /// Query or scan, the operations that report a scanned count
    pub fn is_read_many(self) -> bool {
        matches!(self, OperationKind::Query | OperationKind::Scan)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata key set on records of failed operations
pub const ERROR_METADATA_KEY: &str = "error";

/// One observed operation
///
/// Records are values: built once per sampled call, appended to the log,
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Operation kind
    pub operation: OperationKind,
    /// When the operation started
    pub timestamp: DateTime<Utc>,
    /// Wall clock latency in milliseconds, retries included
    pub latency_ms: f64,
    /// Consumed read capacity units
    pub read_units: f64,
    /// Consumed write capacity units
    pub write_units: f64,
    /// Items returned or written
    pub item_count: usize,
    /// Items evaluated by the store, queries and scans only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_count: Option<usize>,
    /// Secondary index the operation targeted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    /// Access pattern the operation executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_name: Option<String>,
    /// Partition key value, rendered as text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// Free-form annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl OperationRecord {
    /// Empty record for `operation`, timestamped now
    pub fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            timestamp: Utc::now(),
            latency_ms: 0.0,
            read_units: 0.0,
            write_units: 0.0,
            item_count: 0,
            scanned_count: None,
            index_name: None,
            pattern_name: None,
            partition_key: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Wall clock latency of the call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_secs_f64() * 1000.0;
        self
    }

    /// Consumed read and write units
    pub fn with_capacity(mut self, consumed: Capacity) -> Self {
        self.read_units = consumed.read_units;
        self.write_units = consumed.write_units;
        self
    }

    /// Items returned or written
    pub fn with_items(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }

    /// Items evaluated before filtering
    pub fn with_scanned(mut self, scanned_count: usize) -> Self {
        self.scanned_count = Some(scanned_count);
        self
    }

    /// Index queried, `None` for the base table
    pub fn on_index(mut self, index_name: Option<&str>) -> Self {
        self.index_name = index_name.map(str::to_owned);
        self
    }

    /// Access pattern that issued the call
    pub fn for_pattern(mut self, pattern_name: impl Into<String>) -> Self {
        self.pattern_name = Some(pattern_name.into());
        self
    }

    /// Partition key in its display form
    pub fn with_partition_key(mut self, partition_key: impl fmt::Display) -> Self {
        self.partition_key = Some(partition_key.to_string());
        self
    }

    /// Add one annotation
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the operation failed
    pub fn is_error(&self) -> bool {
        self.metadata.contains_key(ERROR_METADATA_KEY)
    }

    /// Read plus write units
    pub fn capacity_units(&self) -> f64 {
        self.read_units + self.write_units
    }
}

/// Sampling configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Fraction of operations recorded, 0.0 to 1.0
    pub sample_rate: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { sample_rate: 1.0 }
    }
}

impl StatsConfig {
    /// Config with a clamped sample rate; NaN disables sampling
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate: clamp_rate(sample_rate),
        }
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

/// Aggregate over the records of one operation kind, pattern or index
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OperationStats {
    /// Number of records
    pub count: usize,
    /// Records carrying an error annotation
    pub error_count: usize,
    /// Mean latency in milliseconds
    pub avg_latency_ms: f64,
    /// Worst latency in milliseconds
    pub max_latency_ms: f64,
    /// Sum of read units
    pub total_read_units: f64,
    /// Sum of write units
    pub total_write_units: f64,
    /// Sum of items returned or written
    pub total_items: usize,
    /// Sum of items scanned, over records that report it
    pub total_scanned: usize,
    /// Mean items per operation
    pub avg_items: f64,
    #[serde(skip)]
    total_latency_ms: f64,
}

impl OperationStats {
    fn add(&mut self, record: &OperationRecord) {
        self.count += 1;
        if record.is_error() {
            self.error_count += 1;
        }
        self.total_latency_ms += record.latency_ms;
        self.max_latency_ms = self.max_latency_ms.max(record.latency_ms);
        self.total_read_units += record.read_units;
        self.total_write_units += record.write_units;
        self.total_items += record.item_count;
        self.total_scanned += record.scanned_count.unwrap_or_default();
    }

    fn finish(&mut self) {
        if self.count > 0 {
            self.avg_latency_ms = self.total_latency_ms / self.count as f64;
            self.avg_items = self.total_items as f64 / self.count as f64;
        }
    }

    /// Total capacity units
    pub fn total_capacity_units(&self) -> f64 {
        self.total_read_units + self.total_write_units
    }

    /// Mean capacity units per operation
    pub fn avg_capacity_units(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_capacity_units() / self.count as f64
        }
    }
}

/// Aggregates over the full retained log, recomputed per call
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableStats {
    /// Records aggregated
    pub total_operations: usize,
    /// Per operation kind
    pub by_operation: BTreeMap<OperationKind, OperationStats>,
    /// Per access pattern name
    pub by_pattern: BTreeMap<String, OperationStats>,
    /// Per secondary index name
    pub by_index: BTreeMap<String, OperationStats>,
    /// Oldest record timestamp
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Newest record timestamp
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl TableStats {
    /// Aggregate a set of records; order does not matter
    pub fn from_records(records: &[OperationRecord]) -> Self {
        let mut stats = TableStats {
            total_operations: records.len(),
            ..Default::default()
        };

        for record in records {
            stats
                .by_operation
                .entry(record.operation)
                .or_default()
                .add(record);
            if let Some(pattern) = &record.pattern_name {
                stats.by_pattern.entry(pattern.clone()).or_default().add(record);
            }
            if let Some(index) = &record.index_name {
                stats.by_index.entry(index.clone()).or_default().add(record);
            }
            stats.first_timestamp = Some(match stats.first_timestamp {
                Some(first) => first.min(record.timestamp),
                None => record.timestamp,
            });
            stats.last_timestamp = Some(match stats.last_timestamp {
                Some(last) => last.max(record.timestamp),
                None => record.timestamp,
            });
        }

        stats
            .by_operation
            .values_mut()
            .chain(stats.by_pattern.values_mut())
            .chain(stats.by_index.values_mut())
            .for_each(OperationStats::finish);
        stats
    }
}

/// Sampled, append-only operation log
///
/// Shared between tables through an `Arc`. Appends take a short lock and
/// never wait on I/O; aggregation works on a copy taken under the lock.
#[derive(Debug, Default)]
pub struct StatsCollector {
    config: StatsConfig,
    records: Mutex<Vec<OperationRecord>>,
}

impl StatsCollector {
    /// Collector with the given sampling configuration
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config: StatsConfig::with_sample_rate(config.sample_rate),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Effective sample rate after clamping
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Decide whether the current operation is recorded
    ///
    /// Rates of 1.0 and 0.0 never consult the random generator.
    pub fn should_sample(&self) -> bool {
        let rate = self.config.sample_rate;
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            rand::thread_rng().gen_range(0.0..1.0) < rate
        }
    }

    /// Append a record; sampling is decided by the caller
    pub fn record(&self, record: OperationRecord) {
        self.records.lock().push(record);
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn snapshot(&self) -> Vec<OperationRecord> {
        self.records.lock().clone()
    }

    /// Aggregate the retained log
    pub fn stats(&self) -> TableStats {
        TableStats::from_records(&self.snapshot())
    }

    /// Copy of the log, oldest first
    pub fn export(&self) -> Vec<OperationRecord> {
        let mut records = self.snapshot();
        records.sort_by_key(|r| r.timestamp);
        records
    }

    /// [`StatsCollector::export`] as a JSON array
    pub fn export_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Drop every retained record
    pub fn reset(&self) {
        let cleared = {
            let mut records = self.records.lock();
            let cleared = records.len();
            records.clear();
            cleared
        };
        tracing::debug!(cleared, "operation log reset");
    }
}
