//! Test helpers and fixtures for access layer integration tests
//!
//! [`FakeStore`] is an in-memory [`StoreClient`] with scriptable failures and
//! call counters, so bulk retries, transactions and telemetry can be tested
//! without a DynamoDB endpoint.
#![allow(dead_code)]

pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;

use aws_sdk_dynamodb::types::AttributeValue;
use dynamo_access::stats::OperationKind;
use dynamo_access::store::{
    BatchGetChunkOutput, BatchGetInput, BatchWriteChunkOutput, BatchWriteInput, Capacity,
    DeleteItemInput, GetItemInput, GetItemOutput, Item, PageOutput, PutItemInput, QueryInput,
    ScanInput, StoreClient, TransactGetInput, TransactGetOutput, TransactWriteInput,
    TransactWriteOp, TransactWriteOutput, UpdateItemInput, WriteItemOutput, WriteOp,
};
use dynamo_access::{CancellationReason, Error};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

type StoredKey = (String, String);

/// Failures the fake injects, consumed as calls arrive
#[derive(Debug, Default)]
pub struct Script {
    /// The first N batch calls leave every request unprocessed
    pub unprocessed_calls: usize,
    /// Partition keys the store never processes in batch calls
    pub stuck_partitions: BTreeSet<String>,
    /// The first N batch or transaction calls fail with throttling
    pub throttled_calls: usize,
    /// Every write transaction is cancelled with these reasons
    pub cancellation: Option<Vec<CancellationReason>>,
}

/// Calls and inputs the fake has seen
#[derive(Debug, Default)]
pub struct Calls {
    pub get: usize,
    pub put: usize,
    pub update: usize,
    pub delete: usize,
    pub query: usize,
    pub scan: usize,
    pub batch_get: usize,
    pub batch_write: usize,
    pub transact_write: usize,
    pub transact_get: usize,
    /// Size of every batch chunk submitted, in arrival order
    pub chunk_sizes: Vec<usize>,
    /// Request token of every write transaction attempt
    pub tokens: Vec<Option<String>>,
    /// Every query request
    pub queries: Vec<QueryInput>,
}

/// In-memory store keyed by the `pk`/`sk` string attributes
#[derive(Debug, Default)]
pub struct FakeStore {
    items: Mutex<BTreeMap<StoredKey, Item>>,
    script: Mutex<Script>,
    calls: Mutex<Calls>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake with a failure script
    pub fn scripted(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            ..Self::default()
        }
    }

    /// Insert items directly, bypassing the call counters
    pub fn seed(&self, items: impl IntoIterator<Item = Item>) {
        let mut stored = self.items.lock();
        for item in items {
            let _ = stored.insert(stored_key(&item), item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn contains(&self, pk: &str, sk: &str) -> bool {
        self.items
            .lock()
            .contains_key(&(pk.to_string(), sk.to_string()))
    }

    /// Inspect the recorded calls
    pub fn calls<R>(&self, f: impl FnOnce(&Calls) -> R) -> R {
        f(&self.calls.lock())
    }

    fn throttle(&self, operation: &'static str) -> Result<(), Error> {
        let mut script = self.script.lock();
        if script.throttled_calls > 0 {
            script.throttled_calls -= 1;
            return Err(Error::Throttled {
                operation,
                message: "rate exceeded".to_string(),
            });
        }
        Ok(())
    }

    /// Whether this batch call leaves everything unprocessed
    fn drop_whole_call(&self) -> bool {
        let mut script = self.script.lock();
        if script.unprocessed_calls > 0 {
            script.unprocessed_calls -= 1;
            return true;
        }
        false
    }

    fn stuck(&self, item: &Item) -> bool {
        self.script.lock().stuck_partitions.contains(&text(item, "pk"))
    }
}

fn text(item: &Item, attribute: &str) -> String {
    match item.get(attribute) {
        Some(AttributeValue::S(value)) => value.clone(),
        Some(AttributeValue::N(value)) => value.clone(),
        _ => String::new(),
    }
}

fn stored_key(item: &Item) -> StoredKey {
    (text(item, "pk"), text(item, "sk"))
}

/// Equality clauses of a key condition, resolved through the placeholders
fn equalities(input: &QueryInput) -> Vec<(String, AttributeValue)> {
    input
        .key_condition_expression
        .split(" AND ")
        .filter_map(|clause| {
            let (name, value) = clause.split_once(" = ")?;
            let name = input.attributes.names.get(name.trim())?;
            let value = input.attributes.values.get(value.trim())?;
            Some((name.clone(), value.clone()))
        })
        .collect()
}

fn requires_absence(condition: Option<&str>) -> bool {
    condition.is_some_and(|c| c.starts_with("attribute_not_exists"))
}

impl StoreClient for FakeStore {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, Error> {
        self.calls.lock().get += 1;
        let item = self.items.lock().get(&stored_key(&input.key)).cloned();
        Ok(GetItemOutput {
            item,
            consumed: Capacity::read(0.5),
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<WriteItemOutput, Error> {
        self.calls.lock().put += 1;
        let key = stored_key(&input.item);
        let mut items = self.items.lock();
        let guard = input.condition.as_ref().map(|c| c.expression.as_str());
        if requires_absence(guard) && items.contains_key(&key) {
            return Err(Error::ConditionalCheckFailed {
                operation: OperationKind::Put,
                table: input.table_name,
            });
        }
        let _ = items.insert(key, input.item);
        Ok(WriteItemOutput {
            attributes: None,
            consumed: Capacity::write(1.0),
        })
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<WriteItemOutput, Error> {
        self.calls.lock().update += 1;
        let mut items = self.items.lock();
        let item = items.entry(stored_key(&input.key)).or_insert(input.key.clone());
        // SET clauses only: `#nX = :vY, ...`
        if let Some(set) = input.update_expression.strip_prefix("SET ") {
            for clause in set.split(", ") {
                if let Some((name, value)) = clause.split_once(" = ") {
                    let name = input.attributes.names.get(name).cloned().unwrap_or_default();
                    if let Some(value) = input.attributes.values.get(value) {
                        let _ = item.insert(name, value.clone());
                    }
                }
            }
        }
        Ok(WriteItemOutput {
            attributes: Some(item.clone()),
            consumed: Capacity::write(1.0),
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<WriteItemOutput, Error> {
        self.calls.lock().delete += 1;
        let removed = self.items.lock().remove(&stored_key(&input.key));
        Ok(WriteItemOutput {
            attributes: removed,
            consumed: Capacity::write(1.0),
        })
    }

    async fn query(&self, input: QueryInput) -> Result<PageOutput, Error> {
        let equalities = equalities(&input);
        self.calls.lock().queries.push(input.clone());
        self.calls.lock().query += 1;

        let matching: Vec<Item> = self
            .items
            .lock()
            .values()
            .filter(|item| {
                equalities
                    .iter()
                    .all(|(name, value)| item.get(name) == Some(value))
            })
            .cloned()
            .collect();

        let start = match &input.exclusive_start_key {
            Some(cursor) => {
                let cursor = stored_key(cursor);
                matching
                    .iter()
                    .position(|item| stored_key(item) == cursor)
                    .map_or(0, |p| p + 1)
            }
            None => 0,
        };
        let limit = input
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        let page: Vec<Item> = matching.iter().skip(start).take(limit).cloned().collect();
        let last_evaluated_key = (start + page.len() < matching.len())
            .then(|| page.last().cloned())
            .flatten();

        Ok(PageOutput {
            count: page.len(),
            scanned_count: page.len(),
            consumed: Capacity::read(0.5 * page.len() as f64),
            items: page,
            last_evaluated_key,
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<PageOutput, Error> {
        self.calls.lock().scan += 1;
        let items: Vec<Item> = self.items.lock().values().cloned().collect();
        let limit = input
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        let page: Vec<Item> = items.iter().take(limit).cloned().collect();
        Ok(PageOutput {
            count: page.len(),
            scanned_count: items.len(),
            consumed: Capacity::read(0.5 * items.len() as f64),
            items: page,
            last_evaluated_key: None,
        })
    }

    async fn batch_get_item(&self, input: BatchGetInput) -> Result<BatchGetChunkOutput, Error> {
        {
            let mut calls = self.calls.lock();
            calls.batch_get += 1;
            calls.chunk_sizes.push(input.keys.len());
        }
        assert!(input.keys.len() <= 100, "read chunk above the store ceiling");
        self.throttle("BatchGetItem")?;

        if self.drop_whole_call() {
            return Ok(BatchGetChunkOutput {
                unprocessed_keys: input.keys,
                ..Default::default()
            });
        }

        let mut output = BatchGetChunkOutput::default();
        let items = self.items.lock();
        for key in input.keys {
            if self.stuck(&key) {
                output.unprocessed_keys.push(key);
            } else if let Some(item) = items.get(&stored_key(&key)) {
                output.items.push(item.clone());
            }
        }
        output.consumed = Capacity::read(0.5 * output.items.len() as f64);
        Ok(output)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteInput,
    ) -> Result<BatchWriteChunkOutput, Error> {
        {
            let mut calls = self.calls.lock();
            calls.batch_write += 1;
            calls.chunk_sizes.push(input.requests.len());
        }
        assert!(input.requests.len() <= 25, "write chunk above the store ceiling");
        self.throttle("BatchWriteItem")?;

        if self.drop_whole_call() {
            return Ok(BatchWriteChunkOutput {
                unprocessed: input.requests,
                ..Default::default()
            });
        }

        let mut output = BatchWriteChunkOutput::default();
        let mut applied = 0.0;
        let mut items = self.items.lock();
        for request in input.requests {
            let (WriteOp::Put(item) | WriteOp::Delete(item)) = &request;
            if self.stuck(item) {
                output.unprocessed.push(request);
                continue;
            }
            applied += 1.0;
            match request {
                WriteOp::Put(item) => {
                    let _ = items.insert(stored_key(&item), item);
                }
                WriteOp::Delete(key) => {
                    let _ = items.remove(&stored_key(&key));
                }
            }
        }
        output.consumed = Capacity::write(applied);
        Ok(output)
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteInput,
    ) -> Result<TransactWriteOutput, Error> {
        {
            let mut calls = self.calls.lock();
            calls.transact_write += 1;
            calls.tokens.push(input.client_request_token.clone());
        }
        self.throttle("TransactWriteItems")?;

        if let Some(reasons) = self.script.lock().cancellation.clone() {
            return Err(Error::TransactionCanceled { reasons });
        }

        let mut items = self.items.lock();
        for op in &input.items {
            match op {
                TransactWriteOp::Put { item, .. } => {
                    let _ = items.insert(stored_key(item), item.clone());
                }
                TransactWriteOp::Delete { key, .. } => {
                    let _ = items.remove(&stored_key(key));
                }
                TransactWriteOp::Update { .. } | TransactWriteOp::ConditionCheck { .. } => {}
            }
        }
        Ok(TransactWriteOutput {
            consumed: Capacity::write(2.0 * input.items.len() as f64),
        })
    }

    async fn transact_get_items(&self, input: TransactGetInput) -> Result<TransactGetOutput, Error> {
        self.calls.lock().transact_get += 1;
        self.throttle("TransactGetItems")?;

        let items = self.items.lock();
        Ok(TransactGetOutput {
            items: input
                .items
                .iter()
                .map(|op| items.get(&stored_key(&op.key)).cloned())
                .collect(),
            consumed: Capacity::read(2.0 * input.items.len() as f64),
        })
    }
}
