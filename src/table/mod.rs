//! The table facade.
//!
//! [`Table`] wires the pattern registry, the bulk executor and the stats
//! collector around one [`StoreClient`]. Every operation that reaches the
//! store samples once, times the call and records one
//! [`OperationRecord`](crate::stats::OperationRecord).

mod batch;
mod operations;
mod types;

pub use types::{PageOptions, Query, Scan, TableSchema, TransactWrite};

use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::Error;
use crate::bulk::{BulkConfig, BulkExecutor};
use crate::config::TableConfig;
use crate::key::IndexShape;
use crate::pattern::{AccessPattern, PatternRegistry};
use crate::stats::{
    ERROR_METADATA_KEY, OperationKind, OperationRecord, Recommendation, RecommendationConfig,
    RecommendationEngine, StatsCollector, TableStats,
};
use crate::store::StoreClient;

/// Access layer for one table
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Table<C = Client> {
    client: C,
    schema: TableSchema,
    registry: PatternRegistry,
    executor: BulkExecutor,
    engine: RecommendationEngine,
    collector: Arc<StatsCollector>,
}

impl<C> fmt::Debug for Table<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema)
            .field("patterns", &self.registry.names())
            .field("bulk", self.executor.config())
            .field("sample_rate", &self.collector.sample_rate())
            .finish()
    }
}

/// Builder returned by [`Table::builder`] and [`Table::connect`]
pub struct TableBuilder<C> {
    client: C,
    schema: TableSchema,
    indexes: Vec<(String, IndexShape)>,
    patterns: Vec<(String, AccessPattern)>,
    config: TableConfig,
    collector: Option<Arc<StatsCollector>>,
}

impl<C> fmt::Debug for TableBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableBuilder")
            .field("schema", &self.schema)
            .field("indexes", &self.indexes)
            .field("patterns", &self.patterns.len())
            .field("config", &self.config)
            .finish()
    }
}

impl<C: StoreClient> TableBuilder<C> {
    /// Declare the key shape of a secondary index
    pub fn index(mut self, index_name: impl Into<String>, shape: IndexShape) -> Self {
        self.indexes.push((index_name.into(), shape));
        self
    }

    /// Register a named access pattern
    pub fn pattern(mut self, name: impl Into<String>, pattern: AccessPattern) -> Self {
        self.patterns.push((name.into(), pattern));
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    /// Chunking and retry settings
    pub fn bulk(mut self, bulk: BulkConfig) -> Self {
        self.config.bulk = bulk;
        self
    }

    /// Recommendation thresholds
    pub fn recommendations(mut self, recommendations: RecommendationConfig) -> Self {
        self.config.recommendations = recommendations;
        self
    }

    /// Fraction of operations recorded, clamped to `0.0..=1.0`
    ///
    /// Ignored when a shared collector is supplied.
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.stats.sample_rate = sample_rate;
        self
    }

    /// Record into an existing collector, possibly shared with other tables
    pub fn collector(mut self, collector: Arc<StatsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Validate the schema and register indexes and patterns
    pub fn build(self) -> Result<Table<C>, Error> {
        if self.schema.table_name.is_empty() {
            return Err(Error::validation("table name is empty"));
        }
        self.schema.primary_key.validate()?;

        let mut registry = PatternRegistry::new(self.schema.primary_key.clone());
        for (index_name, shape) in self.indexes {
            registry.register_index(index_name, shape)?;
        }
        for (name, pattern) in self.patterns {
            registry.register(name, pattern)?;
        }

        let collector = self
            .collector
            .unwrap_or_else(|| Arc::new(StatsCollector::new(self.config.stats)));

        tracing::debug!(
            table = %self.schema.table_name,
            patterns = registry.names().len(),
            sample_rate = collector.sample_rate(),
            "table ready"
        );

        Ok(Table {
            client: self.client,
            schema: self.schema,
            registry,
            executor: BulkExecutor::new(self.config.bulk),
            engine: RecommendationEngine::new(self.config.recommendations),
            collector,
        })
    }
}

impl Table<Client> {
    /// Builder over the global client (see [`crate::dynamodb_client`])
    pub async fn connect(schema: TableSchema) -> TableBuilder<Client> {
        let client = crate::dynamodb_client().await.clone();
        Table::builder(client, schema)
    }
}

impl<C: StoreClient> Table<C> {
    /// Builder over an explicit store client
    pub fn builder(client: C, schema: TableSchema) -> TableBuilder<C> {
        TableBuilder {
            client,
            schema,
            indexes: Vec::new(),
            patterns: Vec::new(),
            config: TableConfig::default(),
            collector: None,
        }
    }

    /// The underlying store client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Table name and primary key layout
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Registered access patterns and index shapes
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// The collector operations are recorded into
    pub fn collector(&self) -> &Arc<StatsCollector> {
        &self.collector
    }

    /// Aggregates over the recorded operations
    pub fn stats(&self) -> TableStats {
        self.collector.stats()
    }

    /// Ranked findings over the recorded operations, as of now
    ///
    /// The unused-index window is measured back from the wall clock, so two
    /// calls on the same log may differ. Use
    /// [`recommendations_at`](Self::recommendations_at) with a fixed instant
    /// for a reproducible result.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.recommendations_at(Utc::now())
    }

    /// Ranked findings evaluated at `now`
    ///
    /// Deterministic for a fixed `now` and an unchanged log.
    pub fn recommendations_at(&self, now: DateTime<Utc>) -> Vec<Recommendation> {
        let records = self.collector.export();
        let stats = TableStats::from_records(&records);
        self.engine
            .recommendations(&records, &stats, &self.registry.index_names(), now)
    }

    /// Recorded operations, oldest first
    pub fn export(&self) -> Vec<OperationRecord> {
        self.collector.export()
    }

    /// Clear the recorded operations
    pub fn reset(&self) {
        self.collector.reset();
    }

    fn observe(&self, operation: OperationKind) -> Observation {
        Observation {
            operation,
            record: self
                .collector
                .should_sample()
                .then(|| OperationRecord::new(operation)),
            started: Instant::now(),
        }
    }

    /// Record the outcome of an observed call
    fn complete<T>(
        &self,
        observation: Observation,
        result: &Result<T, Error>,
        describe: impl FnOnce(OperationRecord, &T) -> OperationRecord,
    ) {
        let elapsed = observation.started.elapsed();
        tracing::debug!(
            table = %self.schema.table_name,
            operation = %observation.operation,
            latency_ms = elapsed.as_secs_f64() * 1000.0,
            ok = result.is_ok(),
            "store call finished"
        );
        let Some(record) = observation.record else {
            return;
        };
        let record = record.with_latency(elapsed);
        let record = match result {
            Ok(output) => describe(record, output),
            Err(err) => record.with_metadata(ERROR_METADATA_KEY, err.to_string()),
        };
        self.collector.record(record);
    }
}

/// A sampled call in flight
struct Observation {
    operation: OperationKind,
    record: Option<OperationRecord>,
    started: Instant,
}

impl Observation {
    fn annotate(mut self, f: impl FnOnce(OperationRecord) -> OperationRecord) -> Self {
        self.record = self.record.map(f);
        self
    }
}
