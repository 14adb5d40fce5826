use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::duration_ms;
use crate::stats::collector::{OperationKind, OperationRecord, TableStats};
use crate::stats::detector::{
    DetectorConfig, detect_hot_partitions, detect_inefficient_reads, detect_unused_indexes,
};

/// How urgent a recommendation is; orders `Info < Warning < Error`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, no action needed yet
    Info,
    /// Likely costing capacity or latency
    Warning,
    /// Likely to cause throttling
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// What a recommendation is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// One partition key draws a large share of traffic
    HotPartition,
    /// Reads evaluate far more items than they return
    InefficientRead,
    /// A registered index saw no recent use
    UnusedIndex,
    /// Operations above the latency threshold
    SlowOperation,
    /// Operations above the capacity threshold
    HighCapacity,
    /// Individual calls that could be one batch request
    Batching,
}

/// One actionable finding
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    /// How urgent
    pub severity: Severity,
    /// What it is about
    pub category: Category,
    /// Human readable summary
    pub message: String,
    /// Structured numbers behind the message
    pub details: BTreeMap<String, serde_json::Value>,
    /// What to change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    /// What the change would save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_impact: Option<String>,
}

impl Recommendation {
    /// Finding without details
    pub fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            details: BTreeMap::new(),
            suggested_action: None,
            estimated_impact: None,
        }
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let _ = self.details.insert(key.into(), value);
        self
    }

    /// Attach a suggested action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.suggested_action = Some(action.into());
        self
    }

    /// Attach an impact estimate
    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.estimated_impact = Some(impact.into());
        self
    }
}

/// Thresholds of the direct checks plus the detector thresholds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Latency above which an operation counts as slow
    #[serde(with = "duration_ms", rename = "slow_latency_ms")]
    pub slow_latency: Duration,
    /// Mean capacity units per operation above which a kind is flagged
    pub high_capacity_units: f64,
    /// Window in which individual calls on one partition could be batched
    #[serde(with = "duration_ms", rename = "batch_window_ms")]
    pub batch_window: Duration,
    /// Individual calls inside the window that make a batching candidate
    pub batch_min_operations: usize,
    /// Anti-pattern detector thresholds
    pub detector: DetectorConfig,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            slow_latency: Duration::from_millis(100),
            high_capacity_units: 10.0,
            batch_window: Duration::from_secs(1),
            batch_min_operations: 3,
            detector: DetectorConfig::default(),
        }
    }
}

/// Merges detector findings and direct threshold checks into one ranked list
///
/// Read-only: the same inputs always produce the same list.
#[derive(Clone, Debug, Default)]
pub struct RecommendationEngine {
    config: RecommendationConfig,
}

impl RecommendationEngine {
    /// Engine with the given thresholds
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    /// Every finding, error first, ties broken by category then message
    pub fn recommendations(
        &self,
        records: &[OperationRecord],
        stats: &TableStats,
        index_names: &[String],
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let detector = &self.config.detector;
        let mut all = detect_hot_partitions(records, detector);
        all.extend(detect_inefficient_reads(records, detector));
        all.extend(detect_unused_indexes(records, index_names, now, detector));
        all.extend(self.slow_operations(records, stats));
        all.extend(self.high_capacity(stats));
        all.extend(self.batching_candidates(records));

        all.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.message.cmp(&b.message))
        });
        all
    }

    fn slow_operations(
        &self,
        records: &[OperationRecord],
        stats: &TableStats,
    ) -> Vec<Recommendation> {
        let threshold_ms = self.config.slow_latency.as_secs_f64() * 1000.0;
        let mut slow: BTreeMap<OperationKind, usize> = BTreeMap::new();
        for record in records.iter().filter(|r| r.latency_ms > threshold_ms) {
            *slow.entry(record.operation).or_default() += 1;
        }

        slow.into_iter()
            .map(|(kind, count)| {
                let kind_stats = stats.by_operation.get(&kind);
                let total = kind_stats.map_or(count, |s| s.count);
                let max_latency_ms = kind_stats.map_or(0.0, |s| s.max_latency_ms);
                Recommendation::new(
                    Severity::Warning,
                    Category::SlowOperation,
                    format!(
                        "{count} of {total} {kind} operations took longer than {threshold_ms:.0}ms"
                    ),
                )
                .with_detail("operation", json!(kind))
                .with_detail("slow_count", json!(count))
                .with_detail("total", json!(total))
                .with_detail("threshold_ms", json!(threshold_ms))
                .with_detail("max_latency_ms", json!(max_latency_ms))
                .with_action("check item sizes, page limits and whether a narrower key condition applies")
            })
            .collect()
    }

    fn high_capacity(&self, stats: &TableStats) -> Vec<Recommendation> {
        stats
            .by_operation
            .iter()
            .filter(|(_, s)| s.avg_capacity_units() > self.config.high_capacity_units)
            .map(|(kind, s)| {
                let average = s.avg_capacity_units();
                Recommendation::new(
                    Severity::Warning,
                    Category::HighCapacity,
                    format!("{kind} operations consume {average:.1} capacity units on average"),
                )
                .with_detail("operation", json!(kind))
                .with_detail("avg_capacity_units", json!(average))
                .with_detail("total_capacity_units", json!(s.total_capacity_units()))
                .with_detail("count", json!(s.count))
                .with_action("project fewer attributes, shrink items or paginate with smaller limits")
                .with_impact(format!(
                    "{:.0} capacity units consumed by {kind} so far",
                    s.total_capacity_units()
                ))
            })
            .collect()
    }

    /// Clusters of individual gets or puts on one partition key
    fn batching_candidates(&self, records: &[OperationRecord]) -> Vec<Recommendation> {
        let mut groups: BTreeMap<(OperationKind, &str), Vec<DateTime<Utc>>> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|r| matches!(r.operation, OperationKind::Get | OperationKind::Put))
        {
            if let Some(key) = record.partition_key.as_deref() {
                groups
                    .entry((record.operation, key))
                    .or_default()
                    .push(record.timestamp);
            }
        }

        let window = chrono::TimeDelta::from_std(self.config.batch_window)
            .unwrap_or(chrono::TimeDelta::MAX);

        groups
            .into_iter()
            .filter_map(|((kind, key), mut timestamps)| {
                timestamps.sort_unstable();
                let largest = largest_cluster(&timestamps, window);
                (largest >= self.config.batch_min_operations).then(|| {
                    let target = batch_operation(kind);
                    Recommendation::new(
                        Severity::Info,
                        Category::Batching,
                        format!(
                            "{largest} individual {kind} calls on partition `{key}` within {}ms could use {target}",
                            self.config.batch_window.as_millis()
                        ),
                    )
                    .with_detail("operation", json!(kind))
                    .with_detail("partition_key", json!(key))
                    .with_detail("cluster_size", json!(largest))
                    .with_detail("total_calls", json!(timestamps.len()))
                    .with_action(format!("group these calls into one {target} request"))
                    .with_impact(format!("up to {} fewer round trips per cluster", largest - 1))
                })
            })
            .collect()
    }
}

fn batch_operation(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Put => "batch_write",
        _ => "batch_get",
    }
}

/// Most timestamps inside any window of the given width; input sorted
fn largest_cluster(timestamps: &[DateTime<Utc>], window: chrono::TimeDelta) -> usize {
    let mut start = 0;
    let mut largest = 0;
    for end in 0..timestamps.len() {
        while timestamps[end] - timestamps[start] > window {
            start += 1;
        }
        largest = largest.max(end - start + 1);
    }
    largest
}
