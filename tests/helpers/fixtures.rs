//! Common test fixtures
//!
//! An orders table keyed by `pk`/`sk` strings with a `byTenantUser` index
//! keyed by `[tenantId, userId]` and sorted by `createdAt`.

use aws_sdk_dynamodb::types::AttributeValue;
use dynamo_access::key::{IndexShape, ItemKey, Key, KeyAttribute};
use dynamo_access::pattern::{AccessPattern, KeyCondition};
use dynamo_access::store::{Item, WriteOp};
use dynamo_access::{Table, TableSchema};
use serde::{Deserialize, Serialize};

use super::FakeStore;

pub const TABLE: &str = "orders";

/// Typed view of an order item
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub pk: String,
    pub sk: String,
    pub tenant_id: String,
    pub user_id: String,
    pub created_at: u64,
    pub total: f64,
}

impl Order {
    pub fn new(tenant: &str, user: &str, n: u64) -> Self {
        Self {
            pk: format!("USER#{user}"),
            sk: format!("ORDER#{n:05}"),
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            created_at: 1_700_000_000 + n,
            total: n as f64,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.pk.as_str()).with_sort(self.sk.as_str())
    }

    pub fn item(&self) -> Item {
        serde_dynamo::to_item(self).unwrap()
    }
}

pub fn primary_key() -> IndexShape {
    IndexShape::new([KeyAttribute::string("pk")]).with_sort_key([KeyAttribute::string("sk")])
}

pub fn tenant_user_shape() -> IndexShape {
    IndexShape::new([KeyAttribute::string("tenantId"), KeyAttribute::string("userId")])
        .with_sort_key([KeyAttribute::number("createdAt")])
}

pub fn schema() -> TableSchema {
    TableSchema::new(TABLE, primary_key())
}

/// `getUserOrders`: partition key built from whichever of tenantId/userId are given
pub fn user_orders_pattern() -> AccessPattern {
    AccessPattern::new(|params| {
        let mut parts = vec![params.get("tenantId")?.clone()];
        if let Some(user) = params.get_opt("userId") {
            parts.push(user.clone());
        }
        Ok(KeyCondition::partition(Key::tuple(parts)))
    })
    .on_index("byTenantUser")
    .with_shape(tenant_user_shape())
}

/// `ordersByUser`: base table query on `pk`
pub fn orders_by_user_pattern() -> AccessPattern {
    AccessPattern::new(|params| {
        Ok(KeyCondition::partition(format!("USER#{}", params.str("userId")?)))
    })
}

/// Table over `store` with both patterns and the given sample rate
pub fn table(store: FakeStore, sample_rate: f64) -> Table<FakeStore> {
    Table::builder(store, schema())
        .pattern("getUserOrders", user_orders_pattern())
        .pattern("ordersByUser", orders_by_user_pattern())
        .sample_rate(sample_rate)
        .build()
        .unwrap()
}

pub fn orders(user: &str, count: u64) -> Vec<Order> {
    (0..count).map(|n| Order::new("T1", user, n)).collect()
}

pub fn puts(orders: &[Order]) -> Vec<WriteOp> {
    orders.iter().map(|o| WriteOp::Put(o.item())).collect()
}

/// Key-only item for batch reads and deletes
pub fn key_item(pk: &str, sk: &str) -> Item {
    Item::from([
        ("pk".to_string(), AttributeValue::S(pk.to_string())),
        ("sk".to_string(), AttributeValue::S(sk.to_string())),
    ])
}
