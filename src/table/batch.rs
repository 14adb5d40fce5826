use crate::Error;
use crate::bulk::{BatchGetOutput, BatchWriteOutput};
use crate::key::ItemKey;
use crate::stats::OperationKind;
use crate::store::{
    Item, StoreClient, TransactGetOp, TransactWriteOp, TransactWriteOutput, WriteOp,
};
use crate::table::operations::{compile_condition, compile_update};
use crate::table::{Table, TransactWrite};

impl<C: StoreClient> Table<C> {
    /// Read any number of items by primary key
    ///
    /// Keys still unprocessed after the configured attempts come back in
    /// [`BatchGetOutput::failed_keys`] rather than as an error.
    pub async fn batch_get(
        &self,
        keys: &[ItemKey],
        consistent_read: bool,
    ) -> Result<BatchGetOutput, Error> {
        let observation = self.observe(OperationKind::BatchGet);

        let result = async {
            let keys = keys
                .iter()
                .map(|key| self.schema.primary_key.encode_item_key(key))
                .collect::<Result<Vec<_>, _>>()?;
            self.executor
                .batch_get(&self.client, &self.schema.table_name, keys, consistent_read)
                .await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record
                .with_capacity(output.consumed)
                .with_items(output.items.len())
                .with_metadata("attempts", output.attempts.to_string())
                .with_metadata("failed", output.failed_keys.len().to_string())
        });
        result
    }

    /// Put and delete any number of items
    ///
    /// Puts must carry the full primary key, deletes carry only the key.
    pub async fn batch_write(&self, requests: Vec<WriteOp>) -> Result<BatchWriteOutput, Error> {
        let observation = self.observe(OperationKind::BatchWrite);

        let result = async {
            for request in &requests {
                let (WriteOp::Put(item) | WriteOp::Delete(item)) = request;
                let _ = self.schema.primary_key.decode_item_key(item)?;
            }
            self.executor
                .batch_write(&self.client, &self.schema.table_name, requests)
                .await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record
                .with_capacity(output.consumed)
                .with_items(output.processed_count())
                .with_metadata("attempts", output.attempts.to_string())
                .with_metadata("failed", output.failed_count().to_string())
        });
        result
    }

    /// Delete any number of items by primary key
    pub async fn batch_delete(&self, keys: &[ItemKey]) -> Result<BatchWriteOutput, Error> {
        let requests = keys
            .iter()
            .map(|key| self.schema.primary_key.encode_item_key(key).map(WriteOp::Delete))
            .collect::<Result<Vec<_>, _>>()?;
        self.batch_write(requests).await
    }

    fn transact_write_op(&self, write: TransactWrite) -> Result<TransactWriteOp, Error> {
        let table_name = self.schema.table_name.clone();
        let shape = &self.schema.primary_key;
        let op = match write {
            TransactWrite::Put { item, condition } => {
                let _ = shape.decode_item_key(&item)?;
                TransactWriteOp::Put {
                    table_name,
                    item,
                    condition: condition.as_ref().map(compile_condition).transpose()?,
                }
            }
            TransactWrite::Update {
                key,
                actions,
                condition,
            } => {
                let (update_expression, condition_expression, attributes) =
                    compile_update(&actions, condition.as_ref())?;
                TransactWriteOp::Update {
                    table_name,
                    key: shape.encode_item_key(&key)?,
                    update_expression,
                    condition_expression,
                    attributes,
                }
            }
            TransactWrite::Delete { key, condition } => TransactWriteOp::Delete {
                table_name,
                key: shape.encode_item_key(&key)?,
                condition: condition.as_ref().map(compile_condition).transpose()?,
            },
            TransactWrite::Check { key, condition } => TransactWriteOp::ConditionCheck {
                table_name,
                key: shape.encode_item_key(&key)?,
                condition: compile_condition(&condition)?,
            },
        };
        Ok(op)
    }

    /// All-or-nothing write of at most 100 items
    ///
    /// `client_request_token` is forwarded unchanged on every retry. A
    /// cancelled transaction surfaces as [`Error::TransactionCanceled`] with
    /// the per-item reasons.
    pub async fn transact_write(
        &self,
        writes: Vec<TransactWrite>,
        client_request_token: Option<String>,
    ) -> Result<TransactWriteOutput, Error> {
        let observation = self.observe(OperationKind::TransactWrite);
        let count = writes.len();

        let result = async {
            let items = writes
                .into_iter()
                .map(|write| self.transact_write_op(write))
                .collect::<Result<Vec<_>, _>>()?;
            self.executor
                .transact_write(&self.client, items, client_request_token)
                .await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record.with_capacity(output.consumed).with_items(count)
        });
        result
    }

    /// All-or-nothing read of at most 100 items, in key order
    pub async fn transact_get(&self, keys: &[ItemKey]) -> Result<Vec<Option<Item>>, Error> {
        let observation = self.observe(OperationKind::TransactGet);

        let result = async {
            let items = keys
                .iter()
                .map(|key| {
                    Ok(TransactGetOp {
                        table_name: self.schema.table_name.clone(),
                        key: self.schema.primary_key.encode_item_key(key)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            self.executor.transact_get(&self.client, items).await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record
                .with_capacity(output.consumed)
                .with_items(output.items.iter().flatten().count())
        });
        result.map(|output| output.items)
    }
}
