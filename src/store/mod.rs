//! Seam between the access layer and the network client of the store.
//!
//! [`StoreClient`] mirrors the DynamoDB primitives the access layer needs.
//! Implementations return errors already classified into [`Error`] kinds
//! (throttling, conditional failure, transaction cancellation, validation),
//! which is what the bulk executor's retry decisions rely on.

mod dynamodb;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::ops::{Add, AddAssign};

use crate::Error;
use crate::pattern::ExpressionAttributes;

/// One item, attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// Hard per-call key ceiling of `BatchGetItem`
pub const BATCH_GET_LIMIT: usize = 100;
/// Hard per-call request ceiling of `BatchWriteItem`
pub const BATCH_WRITE_LIMIT: usize = 25;
/// Hard per-call item ceiling of `TransactWriteItems` / `TransactGetItems`
pub const TRANSACT_ITEMS_LIMIT: usize = 100;

/// Capacity units consumed by one or more calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    /// Read capacity units
    pub read_units: f64,
    /// Write capacity units
    pub write_units: f64,
}

impl Capacity {
    /// Read-only consumption
    pub fn read(units: f64) -> Self {
        Self {
            read_units: units,
            write_units: 0.0,
        }
    }

    /// Write-only consumption
    pub fn write(units: f64) -> Self {
        Self {
            read_units: 0.0,
            write_units: units,
        }
    }

    /// Read plus write units
    pub fn total(&self) -> f64 {
        self.read_units + self.write_units
    }
}

impl Add for Capacity {
    type Output = Capacity;

    fn add(self, rhs: Capacity) -> Capacity {
        Capacity {
            read_units: self.read_units + rhs.read_units,
            write_units: self.write_units + rhs.write_units,
        }
    }
}

impl AddAssign for Capacity {
    fn add_assign(&mut self, rhs: Capacity) {
        *self = *self + rhs;
    }
}

/// Expression string plus the placeholders it uses
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledExpression {
    /// Expression text
    pub expression: String,
    /// Placeholder maps
    pub attributes: ExpressionAttributes,
}

/// `GetItem` request
#[derive(Clone, Debug, PartialEq)]
pub struct GetItemInput {
    /// Table name
    pub table_name: String,
    /// Primary key attributes
    pub key: Item,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// `GetItem` response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetItemOutput {
    /// The item, when it exists
    pub item: Option<Item>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// `PutItem` request
#[derive(Clone, Debug, PartialEq)]
pub struct PutItemInput {
    /// Table name
    pub table_name: String,
    /// Full item
    pub item: Item,
    /// Condition that must hold for the write to apply
    pub condition: Option<CompiledExpression>,
}

/// `UpdateItem` request
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateItemInput {
    /// Table name
    pub table_name: String,
    /// Primary key attributes
    pub key: Item,
    /// `SET ... ADD ... REMOVE ...`
    pub update_expression: String,
    /// Condition that must hold for the write to apply
    pub condition_expression: Option<String>,
    /// Placeholders shared by both expressions
    pub attributes: ExpressionAttributes,
}

/// `DeleteItem` request
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteItemInput {
    /// Table name
    pub table_name: String,
    /// Primary key attributes
    pub key: Item,
    /// Condition that must hold for the delete to apply
    pub condition: Option<CompiledExpression>,
}

/// Response of the single-item write calls
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteItemOutput {
    /// Attributes returned by the store (all new values for updates)
    pub attributes: Option<Item>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// `Query` request
#[derive(Clone, Debug, PartialEq)]
pub struct QueryInput {
    /// Table name
    pub table_name: String,
    /// Secondary index to query
    pub index_name: Option<String>,
    /// Key condition expression
    pub key_condition_expression: String,
    /// Filter applied after the key condition
    pub filter_expression: Option<String>,
    /// Placeholders shared by both expressions
    pub attributes: ExpressionAttributes,
    /// Maximum number of items to evaluate
    pub limit: Option<i32>,
    /// Pagination cursor
    pub exclusive_start_key: Option<Item>,
    /// Ascending sort key order when `true`
    pub scan_forward: bool,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// `Scan` request
#[derive(Clone, Debug, PartialEq)]
pub struct ScanInput {
    /// Table name
    pub table_name: String,
    /// Secondary index to scan
    pub index_name: Option<String>,
    /// Filter expression
    pub filter_expression: Option<String>,
    /// Placeholders of the filter
    pub attributes: ExpressionAttributes,
    /// Maximum number of items to evaluate
    pub limit: Option<i32>,
    /// Pagination cursor
    pub exclusive_start_key: Option<Item>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// One page of a query or scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageOutput {
    /// Items that passed the filter
    pub items: Vec<Item>,
    /// Number of items returned
    pub count: usize,
    /// Number of items evaluated before filtering
    pub scanned_count: usize,
    /// Cursor for the next page, `None` on the last page
    pub last_evaluated_key: Option<Item>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// `BatchGetItem` request for one table, at most [`BATCH_GET_LIMIT`] keys
#[derive(Clone, Debug, PartialEq)]
pub struct BatchGetInput {
    /// Table name
    pub table_name: String,
    /// Primary keys
    pub keys: Vec<Item>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// `BatchGetItem` response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetChunkOutput {
    /// Items found
    pub items: Vec<Item>,
    /// Keys the store did not process in this call
    pub unprocessed_keys: Vec<Item>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// Put or delete inside a batch write
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Put a full item
    Put(Item),
    /// Delete by primary key
    Delete(Item),
}

/// `BatchWriteItem` request for one table, at most [`BATCH_WRITE_LIMIT`] requests
#[derive(Clone, Debug, PartialEq)]
pub struct BatchWriteInput {
    /// Table name
    pub table_name: String,
    /// Put and delete requests
    pub requests: Vec<WriteOp>,
}

/// `BatchWriteItem` response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteChunkOutput {
    /// Requests the store did not process in this call
    pub unprocessed: Vec<WriteOp>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// One item of a write transaction
#[derive(Clone, Debug, PartialEq)]
pub enum TransactWriteOp {
    /// Conditional put
    Put {
        /// Table name
        table_name: String,
        /// Full item
        item: Item,
        /// Optional condition
        condition: Option<CompiledExpression>,
    },
    /// Conditional update
    Update {
        /// Table name
        table_name: String,
        /// Primary key attributes
        key: Item,
        /// Update expression
        update_expression: String,
        /// Optional condition expression
        condition_expression: Option<String>,
        /// Placeholders shared by both expressions
        attributes: ExpressionAttributes,
    },
    /// Conditional delete
    Delete {
        /// Table name
        table_name: String,
        /// Primary key attributes
        key: Item,
        /// Optional condition
        condition: Option<CompiledExpression>,
    },
    /// Condition on an item that is not written
    ConditionCheck {
        /// Table name
        table_name: String,
        /// Primary key attributes
        key: Item,
        /// Condition that must hold
        condition: CompiledExpression,
    },
}

/// `TransactWriteItems` request
#[derive(Clone, Debug, PartialEq)]
pub struct TransactWriteInput {
    /// Transaction items, all-or-nothing
    pub items: Vec<TransactWriteOp>,
    /// Idempotency token supplied by the caller
    pub client_request_token: Option<String>,
}

/// `TransactWriteItems` response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactWriteOutput {
    /// Consumed capacity
    pub consumed: Capacity,
}

/// One read of a read transaction
#[derive(Clone, Debug, PartialEq)]
pub struct TransactGetOp {
    /// Table name
    pub table_name: String,
    /// Primary key attributes
    pub key: Item,
}

/// `TransactGetItems` request
#[derive(Clone, Debug, PartialEq)]
pub struct TransactGetInput {
    /// Reads, all-or-nothing
    pub items: Vec<TransactGetOp>,
}

/// `TransactGetItems` response
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactGetOutput {
    /// One entry per requested key, in request order
    pub items: Vec<Option<Item>>,
    /// Consumed capacity
    pub consumed: Capacity,
}

/// Network client of the store
///
/// Implemented for [`aws_sdk_dynamodb::Client`]; tests provide in-memory
/// implementations. Every call is one network round trip and the only place
/// the access layer suspends.
pub trait StoreClient: Send + Sync {
    /// Single item read
    fn get_item(&self, input: GetItemInput)
    -> impl Future<Output = Result<GetItemOutput, Error>> + Send;

    /// Single item put
    fn put_item(
        &self,
        input: PutItemInput,
    ) -> impl Future<Output = Result<WriteItemOutput, Error>> + Send;

    /// Single item update
    fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> impl Future<Output = Result<WriteItemOutput, Error>> + Send;

    /// Single item delete
    fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> impl Future<Output = Result<WriteItemOutput, Error>> + Send;

    /// One page of a query
    fn query(&self, input: QueryInput) -> impl Future<Output = Result<PageOutput, Error>> + Send;

    /// One page of a scan
    fn scan(&self, input: ScanInput) -> impl Future<Output = Result<PageOutput, Error>> + Send;

    /// One `BatchGetItem` call
    fn batch_get_item(
        &self,
        input: BatchGetInput,
    ) -> impl Future<Output = Result<BatchGetChunkOutput, Error>> + Send;

    /// One `BatchWriteItem` call
    fn batch_write_item(
        &self,
        input: BatchWriteInput,
    ) -> impl Future<Output = Result<BatchWriteChunkOutput, Error>> + Send;

    /// One `TransactWriteItems` call
    fn transact_write_items(
        &self,
        input: TransactWriteInput,
    ) -> impl Future<Output = Result<TransactWriteOutput, Error>> + Send;

    /// One `TransactGetItems` call
    fn transact_get_items(
        &self,
        input: TransactGetInput,
    ) -> impl Future<Output = Result<TransactGetOutput, Error>> + Send;
}
