//! Anti-pattern analyses over the operation log.
//!
//! Each detector is a pure function of the records (and, for unused indexes,
//! the registered index names and a reference instant). None of them depends
//! on another, and all of them return findings in a deterministic order.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::duration_ms;
use crate::stats::collector::OperationRecord;
use crate::stats::recommend::{Category, Recommendation, Severity};

/// Share above which a hot partition is reported as an error
const HOT_PARTITION_ERROR_SHARE: f64 = 0.5;

/// Detector thresholds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Traffic share above which a partition key is hot
    pub hot_partition_threshold: f64,
    /// Fewest recorded operations before hot partition analysis runs, 0 to always run
    pub hot_partition_min_records: usize,
    /// Returned/scanned ratio below which reads are inefficient
    pub min_efficiency: f64,
    /// Trailing window an index must have been used in
    #[serde(with = "duration_ms", rename = "unused_index_window_ms")]
    pub unused_index_window: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hot_partition_threshold: 0.10,
            hot_partition_min_records: 0,
            min_efficiency: 0.20,
            unused_index_window: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Partition keys carrying more than the configured share of all recorded traffic
///
/// Every record counts towards the total, including scans and other calls
/// without a partition key. Findings are ordered by share, highest first.
pub fn detect_hot_partitions(
    records: &[OperationRecord],
    config: &DetectorConfig,
) -> Vec<Recommendation> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for key in records.iter().filter_map(|r| r.partition_key.as_deref()) {
        *counts.entry(key).or_default() += 1;
    }
    let total = records.len();
    if counts.is_empty() || total < config.hot_partition_min_records {
        return Vec::new();
    }

    let mut hot: Vec<(&str, usize, f64)> = counts
        .into_iter()
        .map(|(key, count)| (key, count, count as f64 / total as f64))
        .filter(|(_, _, share)| *share > config.hot_partition_threshold)
        .collect();
    hot.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(b.0)));

    hot.into_iter()
        .map(|(key, count, share)| {
            let severity = if share > HOT_PARTITION_ERROR_SHARE {
                Severity::Error
            } else {
                Severity::Warning
            };
            Recommendation::new(
                severity,
                Category::HotPartition,
                format!(
                    "partition key `{key}` received {:.1}% of traffic ({count} of {total} operations)",
                    share * 100.0
                ),
            )
            .with_detail("partition_key", json!(key))
            .with_detail("share", json!(share))
            .with_detail("count", json!(count))
            .with_detail("total", json!(total))
            .with_action(
                "spread writes with a sharded partition key suffix or cache hot reads",
            )
            .with_impact(format!(
                "throttling risk concentrated on one partition ({:.0}% of requests)",
                share * 100.0
            ))
        })
        .collect()
}

/// Queries and scans returning too few of the items they evaluate
///
/// Records are grouped by pattern name, or by operation kind when no
/// pattern ran. Efficiency is aggregated over the group, not averaged.
pub fn detect_inefficient_reads(
    records: &[OperationRecord],
    config: &DetectorConfig,
) -> Vec<Recommendation> {
    let mut groups: BTreeMap<String, (usize, usize, usize)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.operation.is_read_many()) {
        let Some(scanned) = record.scanned_count else {
            continue;
        };
        let group = record
            .pattern_name
            .clone()
            .unwrap_or_else(|| record.operation.to_string());
        let entry = groups.entry(group).or_default();
        entry.0 += record.item_count;
        entry.1 += scanned;
        entry.2 += 1;
    }

    groups
        .into_iter()
        .filter(|(_, (_, scanned, _))| *scanned > 0)
        .filter_map(|(group, (returned, scanned, operations))| {
            let efficiency = returned as f64 / scanned as f64;
            (efficiency < config.min_efficiency).then(|| {
                Recommendation::new(
                    Severity::Warning,
                    Category::InefficientRead,
                    format!(
                        "`{group}` returned {returned} of {scanned} scanned items ({:.1}% efficiency)",
                        efficiency * 100.0
                    ),
                )
                .with_detail("group", json!(group))
                .with_detail("efficiency", json!(efficiency))
                .with_detail("items_returned", json!(returned))
                .with_detail("items_scanned", json!(scanned))
                .with_detail("operations", json!(operations))
                .with_action(
                    "move the filtered attribute into the sort key or a secondary index",
                )
                .with_impact(format!(
                    "about {:.0}% of read capacity spent on discarded items",
                    (1.0 - efficiency) * 100.0
                ))
            })
        })
        .collect()
}

/// Registered indexes with no recorded use inside the trailing window
///
/// An empty log says nothing about usage, so nothing is reported then.
pub fn detect_unused_indexes(
    records: &[OperationRecord],
    index_names: &[String],
    now: DateTime<Utc>,
    config: &DetectorConfig,
) -> Vec<Recommendation> {
    if records.is_empty() {
        return Vec::new();
    }

    let window = TimeDelta::from_std(config.unused_index_window).unwrap_or(TimeDelta::MAX);
    let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let used: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.timestamp >= since && r.timestamp <= now)
        .filter_map(|r| r.index_name.as_deref())
        .collect();

    let days = config.unused_index_window.as_secs() / (24 * 60 * 60);
    let registered: BTreeSet<&str> = index_names.iter().map(String::as_str).collect();
    registered
        .into_iter()
        .filter(|index| !used.contains(index))
        .map(|index| {
            Recommendation::new(
                Severity::Info,
                Category::UnusedIndex,
                format!("index `{index}` has no recorded operations in the last {days} days"),
            )
            .with_detail("index_name", json!(index))
            .with_detail(
                "window_ms",
                json!(config.unused_index_window.as_millis() as u64),
            )
            .with_action("drop the index if no access pattern needs it")
            .with_impact("saves the write capacity and storage the index replicates")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::collector::OperationKind;

    fn keyed(key: &str) -> OperationRecord {
        OperationRecord::new(OperationKind::Get).with_partition_key(key)
    }

    #[test]
    fn test_hot_partition_share() {
        let mut records: Vec<_> = (0..900).map(|_| keyed("USER#hot")).collect();
        records.extend((0..100).map(|i| keyed(&format!("USER#{i}"))));

        let findings = detect_hot_partitions(&records, &DetectorConfig::default());
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.details["partition_key"], json!("USER#hot"));
        let share = finding.details["share"].as_f64().unwrap();
        assert!((share - 0.9).abs() < 1e-9);
        assert_eq!(finding.details["count"], json!(900));
    }

    #[test]
    fn test_hot_partition_threshold_is_exclusive() {
        let records: Vec<_> = (0..100).map(|i| keyed(&format!("K{}", i % 10))).collect();
        assert!(detect_hot_partitions(&records, &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn test_hot_partition_min_records_is_opt_in() {
        let records: Vec<_> = (0..5).map(|_| keyed("K1")).collect();
        let findings = detect_hot_partitions(&records, &DetectorConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].details["count"], json!(5));

        let config = DetectorConfig {
            hot_partition_min_records: 10,
            ..Default::default()
        };
        assert!(detect_hot_partitions(&records, &config).is_empty());
    }

    #[test]
    fn test_hot_partition_share_counts_unkeyed_traffic() {
        let mut records: Vec<_> = (0..10).map(|_| keyed("USER#1")).collect();
        records.extend((0..190).map(|_| OperationRecord::new(OperationKind::Scan)));
        assert!(detect_hot_partitions(&records, &DetectorConfig::default()).is_empty());

        records.extend((0..40).map(|_| keyed("USER#1")));
        let findings = detect_hot_partitions(&records, &DetectorConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].details["total"], json!(240));
        let share = findings[0].details["share"].as_f64().unwrap();
        assert!((share - 50.0 / 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_inefficient_reads_grouped_by_pattern() {
        let records = vec![
            OperationRecord::new(OperationKind::Query)
                .for_pattern("openOrders")
                .with_items(1)
                .with_scanned(50),
            OperationRecord::new(OperationKind::Query)
                .for_pattern("openOrders")
                .with_items(9)
                .with_scanned(50),
            OperationRecord::new(OperationKind::Query)
                .for_pattern("getUser")
                .with_items(1)
                .with_scanned(1),
            OperationRecord::new(OperationKind::Scan)
                .with_items(0)
                .with_scanned(0),
        ];

        let findings = detect_inefficient_reads(&records, &DetectorConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].details["group"], json!("openOrders"));
        assert_eq!(findings[0].details["efficiency"], json!(0.1));
    }

    #[test]
    fn test_unused_index_window() {
        let now = Utc::now();
        let indexes = vec!["byEmail".to_string(), "byStatus".to_string()];
        let records = vec![
            OperationRecord::new(OperationKind::Query)
                .on_index(Some("byEmail"))
                .at(now - TimeDelta::days(1)),
            OperationRecord::new(OperationKind::Query)
                .on_index(Some("byStatus"))
                .at(now - TimeDelta::days(30)),
        ];

        let findings = detect_unused_indexes(&records, &indexes, now, &DetectorConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].details["index_name"], json!("byStatus"));

        assert!(detect_unused_indexes(&[], &indexes, now, &DetectorConfig::default()).is_empty());
    }
}
