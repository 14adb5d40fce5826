/// Recommendation tests
///
/// Findings derived from operations recorded through the table facade.
mod helpers;
use chrono::{TimeDelta, Utc};
use dynamo_access::pattern::Params;
use dynamo_access::stats::{Category, DetectorConfig, RecommendationConfig, Severity};
use dynamo_access::{PageOptions, Scan, Table};
use helpers::*;
use serde_json::json;

async fn skewed_table() -> Table<FakeStore> {
    let store = FakeStore::new();
    store.seed(orders("u1", 9).iter().map(Order::item));
    store.seed(orders("u2", 1).iter().map(Order::item));
    let table = table(store, 1.0);

    for order in orders("u1", 9).iter().chain(&orders("u2", 1)) {
        let _ = table.get(&order.key(), false).await.unwrap();
    }
    table
}

/// A partition with most of the traffic is reported as an error
#[tokio::test]
async fn test_hot_partition_is_an_error() {
    let table = skewed_table().await;

    let found = table.recommendations();

    let hot: Vec<_> = found
        .iter()
        .filter(|r| r.category == Category::HotPartition)
        .collect();
    assert_eq!(hot.len(), 1);
    assert_eq!(hot[0].severity, Severity::Error);
    assert_eq!(hot[0].details["partition_key"], json!("USER#u1"));
    assert_eq!(hot[0].details["count"], json!(9));
    // errors rank first
    assert_eq!(found[0].category, Category::HotPartition);
}

/// A small but concentrated workload is flagged unless a floor is configured,
/// and scans without a partition key dilute the share
#[tokio::test]
async fn test_hot_partition_share_of_all_traffic() {
    let store = FakeStore::new();
    store.seed(orders("u1", 1).iter().map(Order::item));
    let table = table(store, 1.0);
    let order = Order::new("T1", "u1", 0);
    for _ in 0..5 {
        let _ = table.get(&order.key(), false).await.unwrap();
    }

    let hot: Vec<_> = table
        .recommendations()
        .into_iter()
        .filter(|r| r.category == Category::HotPartition)
        .collect();
    assert_eq!(hot.len(), 1);
    assert_eq!(hot[0].details["total"], json!(5));

    for _ in 0..45 {
        let _ = table.scan(&Scan::new()).await.unwrap();
    }
    assert!(
        table
            .recommendations()
            .iter()
            .all(|r| r.category != Category::HotPartition)
    );

    let floored = Table::builder(FakeStore::new(), schema())
        .recommendations(RecommendationConfig {
            detector: DetectorConfig {
                hot_partition_min_records: 10,
                ..Default::default()
            },
            ..Default::default()
        })
        .build()
        .unwrap();
    for _ in 0..5 {
        let _ = floored.get(&order.key(), false).await.unwrap();
    }
    assert!(
        floored
            .recommendations()
            .iter()
            .all(|r| r.category != Category::HotPartition)
    );
}

/// Clustered single gets suggest batch_get
#[tokio::test]
async fn test_repeated_gets_suggest_batching() {
    let table = skewed_table().await;

    let found = table.recommendations();

    let batching = found
        .iter()
        .find(|r| r.category == Category::Batching)
        .unwrap();
    assert_eq!(batching.severity, Severity::Info);
    assert_eq!(batching.details["cluster_size"], json!(9));
    assert!(batching.message.contains("batch_get"));
}

/// A fixed instant gives the same ranked findings every time
#[tokio::test]
async fn test_recommendations_are_deterministic_for_fixed_now() {
    let table = skewed_table().await;
    let now = Utc::now();

    let first = table.recommendations_at(now);
    let second = table.recommendations_at(now);

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert!(
        first
            .windows(2)
            .all(|pair| pair[0].severity >= pair[1].severity)
    );
}

/// An index without traffic in the window is reported as unused
#[tokio::test]
async fn test_unused_index_reported_until_used() {
    let store = FakeStore::new();
    store.seed(orders("u1", 2).iter().map(Order::item));
    let table = Table::builder(store, schema())
        .index("byStatus", primary_key())
        .pattern("getUserOrders", user_orders_pattern())
        .build()
        .unwrap();

    let _ = table
        .execute_pattern(
            "getUserOrders",
            &Params::new().with("tenantId", "T1").with("userId", "u1"),
        )
        .await
        .unwrap();

    let unused: Vec<_> = table
        .recommendations()
        .into_iter()
        .filter(|r| r.category == Category::UnusedIndex)
        .collect();
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].severity, Severity::Info);
    assert_eq!(unused[0].details["index_name"], json!("byStatus"));

    // outside the trailing window every index is unused
    let later = Utc::now() + TimeDelta::days(30);
    let unused = table
        .recommendations_at(later)
        .into_iter()
        .filter(|r| r.category == Category::UnusedIndex)
        .count();
    assert_eq!(unused, 2);
}

/// An empty log produces no findings
#[tokio::test]
async fn test_nothing_recorded_means_no_unused_index_findings() {
    let table = Table::builder(FakeStore::new(), schema())
        .index("byStatus", primary_key())
        .build()
        .unwrap();

    assert!(table.recommendations().is_empty());
}

/// A scan returning few of the items it read is inefficient
#[tokio::test]
async fn test_low_yield_scan_is_inefficient() {
    let store = FakeStore::new();
    store.seed(orders("u1", 10).iter().map(Order::item));
    let table = table(store, 1.0);

    let page = table
        .scan(&Scan::new().with_page(PageOptions::default().limit(1)))
        .await
        .unwrap();
    assert_eq!(page.count, 1);

    let inefficient = table
        .recommendations()
        .into_iter()
        .find(|r| r.category == Category::InefficientRead)
        .unwrap();
    assert_eq!(inefficient.severity, Severity::Warning);
    assert_eq!(inefficient.details["group"], json!("scan"));
    assert_eq!(inefficient.details["items_scanned"], json!(10));
}

/// Detection thresholds are taken from the table configuration
#[tokio::test]
async fn test_thresholds_come_from_config() {
    let store = FakeStore::new();
    store.seed(orders("u1", 9).iter().map(Order::item));
    let table = Table::builder(store, schema())
        .recommendations(RecommendationConfig {
            batch_min_operations: 50,
            ..Default::default()
        })
        .build()
        .unwrap();
    for order in orders("u1", 9) {
        let _ = table.get(&order.key(), false).await.unwrap();
    }

    assert!(
        table
            .recommendations()
            .iter()
            .all(|r| r.category != Category::Batching)
    );
}

/// Reset clears both the log and the findings
#[tokio::test]
async fn test_reset_clears_findings() {
    let table = skewed_table().await;
    assert!(!table.recommendations().is_empty());

    table.reset();

    assert!(table.recommendations().is_empty());
    assert_eq!(table.stats().total_operations, 0);
}
