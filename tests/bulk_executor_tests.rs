/// Bulk executor tests
///
/// Chunking to the store ceilings, retry rounds for unprocessed items and
/// throttled chunks, and the partial-result contract after the last attempt.
use std::collections::BTreeSet;

mod helpers;
use dynamo_access::bulk::{BulkConfig, BulkExecutor};
use helpers::*;

fn executor() -> BulkExecutor {
    BulkExecutor::new(BulkConfig::default())
}

/// Reads are split into chunks of at most 100 keys
#[tokio::test(start_paused = true)]
async fn test_batch_get_issues_one_call_per_hundred_keys() {
    let store = FakeStore::new();
    let orders = orders("u1", 250);
    store.seed(orders.iter().map(Order::item));
    let keys = orders.iter().map(|o| key_item(&o.pk, &o.sk)).collect();

    let output = executor().batch_get(&store, TABLE, keys, false).await.unwrap();

    assert!(output.is_success());
    assert_eq!(output.items.len(), 250);
    assert_eq!(output.attempts, 1);
    store.calls(|calls| {
        assert_eq!(calls.batch_get, 3);
        let mut sizes = calls.chunk_sizes.clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 100, 100]);
    });
}

/// Writes are split into chunks of at most 25 requests
#[tokio::test(start_paused = true)]
async fn test_batch_write_issues_one_call_per_twenty_five_requests() {
    for (count, expected_calls) in [(1, 1), (25, 1), (26, 2), (60, 3), (100, 4)] {
        let store = FakeStore::new();
        let output = executor()
            .batch_write(&store, TABLE, puts(&orders("u1", count)))
            .await
            .unwrap();

        assert!(output.is_success());
        assert_eq!(output.processed_count(), count as usize);
        assert_eq!(store.len(), count as usize);
        store.calls(|calls| assert_eq!(calls.batch_write, expected_calls, "{count} requests"));
    }
}

/// A configured chunk size above the store ceiling is clamped to it
#[tokio::test(start_paused = true)]
async fn test_chunk_size_config_is_clamped() {
    let store = FakeStore::new();
    let executor = BulkExecutor::new(BulkConfig {
        write_chunk_size: 500,
        ..Default::default()
    });

    let output = executor
        .batch_write(&store, TABLE, puts(&orders("u1", 60)))
        .await
        .unwrap();

    assert!(output.is_success());
    store.calls(|calls| assert!(calls.chunk_sizes.iter().all(|&size| size <= 25)));
}

/// Unprocessed writes are resubmitted in a second round
#[tokio::test(start_paused = true)]
async fn test_unprocessed_then_success_takes_two_attempts() {
    // 60 writes are 3 chunks; the whole first round comes back unprocessed
    let store = FakeStore::scripted(Script {
        unprocessed_calls: 3,
        ..Default::default()
    });

    let output = executor()
        .batch_write(&store, TABLE, puts(&orders("u1", 60)))
        .await
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.attempts, 2);
    assert_eq!(output.retry_count(), 1);
    assert_eq!(output.processed_count(), 60);
    assert_eq!(store.len(), 60);
    store.calls(|calls| assert_eq!(calls.batch_write, 6));
}

/// A read round returned whole as unprocessed is resubmitted once and succeeds
#[tokio::test(start_paused = true)]
async fn test_batch_get_unprocessed_then_success_takes_two_attempts() {
    let store = FakeStore::scripted(Script {
        unprocessed_calls: 1,
        ..Default::default()
    });
    let orders = orders("u1", 8);
    store.seed(orders.iter().map(Order::item));
    let keys = orders.iter().map(|o| key_item(&o.pk, &o.sk)).collect();

    let output = executor().batch_get(&store, TABLE, keys, false).await.unwrap();

    assert!(output.is_success());
    assert_eq!(output.attempts, 2);
    assert_eq!(output.items.len(), 8);
    assert!(output.failed_keys.is_empty());
    store.calls(|calls| assert_eq!(calls.batch_get, 2));
}

/// Writes still unprocessed after the last attempt come back as failed
#[tokio::test(start_paused = true)]
async fn test_persistently_unprocessed_requests_are_returned_as_failed() {
    let store = FakeStore::scripted(Script {
        stuck_partitions: BTreeSet::from(["USER#u2".to_string()]),
        ..Default::default()
    });
    let mut requests = puts(&orders("u1", 10));
    requests.extend(puts(&orders("u2", 5)));

    let output = executor().batch_write(&store, TABLE, requests).await.unwrap();

    assert!(!output.is_success());
    assert_eq!(output.attempts, 3);
    assert_eq!(output.processed_count(), 10);
    assert_eq!(output.failed_count(), 5);
    assert!((output.success_rate() - 66.666).abs() < 0.01);
    assert_eq!(store.len(), 10);
}

/// Keys still unprocessed after the last attempt come back as failed keys
#[tokio::test(start_paused = true)]
async fn test_batch_get_reports_failed_keys() {
    let store = FakeStore::scripted(Script {
        stuck_partitions: BTreeSet::from(["USER#u2".to_string()]),
        ..Default::default()
    });
    let mut all = orders("u1", 4);
    all.extend(orders("u2", 2));
    store.seed(all.iter().map(Order::item));
    let keys = all.iter().map(|o| key_item(&o.pk, &o.sk)).collect();

    let output = executor().batch_get(&store, TABLE, keys, true).await.unwrap();

    assert_eq!(output.items.len(), 4);
    assert_eq!(output.failed_keys.len(), 2);
    assert_eq!(output.attempts, 3);
    // u2 keys are resubmitted every round
    store.calls(|calls| assert_eq!(calls.batch_get, 3));
}

/// A throttled chunk is retried in full on the next round
#[tokio::test(start_paused = true)]
async fn test_throttled_chunk_is_requeued_whole() {
    let store = FakeStore::scripted(Script {
        throttled_calls: 1,
        ..Default::default()
    });

    let output = executor()
        .batch_write(&store, TABLE, puts(&orders("u1", 10)))
        .await
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.attempts, 2);
    assert_eq!(output.processed_count(), 10);
}

/// An empty batch returns immediately without calling the store
#[tokio::test(start_paused = true)]
async fn test_empty_batch_makes_no_calls() {
    let store = FakeStore::new();

    let output = executor().batch_write(&store, TABLE, Vec::new()).await.unwrap();

    assert!(output.is_success());
    assert_eq!(output.attempts, 0);
    store.calls(|calls| assert_eq!(calls.batch_write, 0));
}
