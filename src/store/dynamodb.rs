use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::transact_get_items::TransactGetItemsError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    CancellationReason as SdkCancellationReason, ConditionCheck, ConsumedCapacity, Delete,
    DeleteRequest, Get, KeysAndAttributes, Put, PutRequest, ReturnConsumedCapacity, ReturnValue,
    TransactGetItem, TransactWriteItem, Update, WriteRequest,
};

use crate::Error;
use crate::error::CancellationReason;
use crate::stats::OperationKind;
use crate::store::{
    BatchGetChunkOutput, BatchGetInput, BatchWriteChunkOutput, BatchWriteInput, Capacity,
    DeleteItemInput, GetItemInput, GetItemOutput, PageOutput, PutItemInput, QueryInput, ScanInput,
    StoreClient, TransactGetInput, TransactGetOutput, TransactWriteInput, TransactWriteOp,
    TransactWriteOutput, UpdateItemInput, WriteItemOutput, WriteOp,
};

#[derive(Clone, Copy)]
enum Side {
    Read,
    Write,
}

/// Capacity units of one response; `Total` responses only fill `capacity_units`
fn capacity(consumed: Option<&ConsumedCapacity>, side: Side) -> Capacity {
    let Some(consumed) = consumed else {
        return Capacity::default();
    };
    let total = consumed.capacity_units.unwrap_or_default();
    match side {
        Side::Read => Capacity {
            read_units: consumed.read_capacity_units.unwrap_or(total),
            write_units: consumed.write_capacity_units.unwrap_or_default(),
        },
        Side::Write => Capacity {
            read_units: consumed.read_capacity_units.unwrap_or_default(),
            write_units: consumed.write_capacity_units.unwrap_or(total),
        },
    }
}

fn capacity_sum(consumed: Option<&[ConsumedCapacity]>, side: Side) -> Capacity {
    consumed
        .unwrap_or_default()
        .iter()
        .fold(Capacity::default(), |acc, c| acc + capacity(Some(c), side))
}

fn cancellation_reasons(reasons: &[SdkCancellationReason]) -> Vec<CancellationReason> {
    reasons
        .iter()
        .enumerate()
        .map(|(index, reason)| CancellationReason {
            index,
            code: reason.code().map(str::to_owned),
            message: reason.message().map(str::to_owned),
        })
        .collect()
}

fn table_of(op: &TransactWriteOp) -> &str {
    match op {
        TransactWriteOp::Put { table_name, .. }
        | TransactWriteOp::Update { table_name, .. }
        | TransactWriteOp::Delete { table_name, .. }
        | TransactWriteOp::ConditionCheck { table_name, .. } => table_name,
    }
}

fn transact_write_item(op: TransactWriteOp) -> Result<TransactWriteItem, Error> {
    let item = match op {
        TransactWriteOp::Put {
            table_name,
            item,
            condition,
        } => {
            let (expression, attributes) = condition
                .map(|c| (Some(c.expression), c.attributes))
                .unwrap_or_default();
            let put = Put::builder()
                .table_name(table_name)
                .set_item(Some(item))
                .set_condition_expression(expression)
                .set_expression_attribute_names(attributes.names_opt())
                .set_expression_attribute_values(attributes.values_opt())
                .build()?;
            TransactWriteItem::builder().put(put).build()
        }
        TransactWriteOp::Update {
            table_name,
            key,
            update_expression,
            condition_expression,
            attributes,
        } => {
            let update = Update::builder()
                .table_name(table_name)
                .set_key(Some(key))
                .update_expression(update_expression)
                .set_condition_expression(condition_expression)
                .set_expression_attribute_names(attributes.names_opt())
                .set_expression_attribute_values(attributes.values_opt())
                .build()?;
            TransactWriteItem::builder().update(update).build()
        }
        TransactWriteOp::Delete {
            table_name,
            key,
            condition,
        } => {
            let (expression, attributes) = condition
                .map(|c| (Some(c.expression), c.attributes))
                .unwrap_or_default();
            let delete = Delete::builder()
                .table_name(table_name)
                .set_key(Some(key))
                .set_condition_expression(expression)
                .set_expression_attribute_names(attributes.names_opt())
                .set_expression_attribute_values(attributes.values_opt())
                .build()?;
            TransactWriteItem::builder().delete(delete).build()
        }
        TransactWriteOp::ConditionCheck {
            table_name,
            key,
            condition,
        } => {
            let check = ConditionCheck::builder()
                .table_name(table_name)
                .set_key(Some(key))
                .condition_expression(condition.expression)
                .set_expression_attribute_names(condition.attributes.names_opt())
                .set_expression_attribute_values(condition.attributes.values_opt())
                .build()?;
            TransactWriteItem::builder().condition_check(check).build()
        }
    };
    Ok(item)
}

impl StoreClient for Client {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, Error> {
        let result = self
            .get_item()
            .table_name(&input.table_name)
            .set_key(Some(input.key))
            .consistent_read(input.consistent_read)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| Error::from_sdk("GetItem", &input.table_name, OperationKind::Get, e))?;

        Ok(GetItemOutput {
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Read),
            item: result.item,
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<WriteItemOutput, Error> {
        let (expression, attributes) = input
            .condition
            .map(|c| (Some(c.expression), c.attributes))
            .unwrap_or_default();

        let result = self
            .put_item()
            .table_name(&input.table_name)
            .set_item(Some(input.item))
            .set_condition_expression(expression)
            .set_expression_attribute_names(attributes.names_opt())
            .set_expression_attribute_values(attributes.values_opt())
            .return_values(ReturnValue::None)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| Error::from_sdk("PutItem", &input.table_name, OperationKind::Put, e))?;

        Ok(WriteItemOutput {
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Write),
            attributes: result.attributes,
        })
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<WriteItemOutput, Error> {
        let result = self
            .update_item()
            .table_name(&input.table_name)
            .set_key(Some(input.key))
            .update_expression(input.update_expression)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.attributes.names_opt())
            .set_expression_attribute_values(input.attributes.values_opt())
            .return_values(ReturnValue::AllNew)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                Error::from_sdk("UpdateItem", &input.table_name, OperationKind::Update, e)
            })?;

        Ok(WriteItemOutput {
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Write),
            attributes: result.attributes,
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<WriteItemOutput, Error> {
        let (expression, attributes) = input
            .condition
            .map(|c| (Some(c.expression), c.attributes))
            .unwrap_or_default();

        let result = self
            .delete_item()
            .table_name(&input.table_name)
            .set_key(Some(input.key))
            .set_condition_expression(expression)
            .set_expression_attribute_names(attributes.names_opt())
            .set_expression_attribute_values(attributes.values_opt())
            .return_values(ReturnValue::None)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                Error::from_sdk("DeleteItem", &input.table_name, OperationKind::Delete, e)
            })?;

        Ok(WriteItemOutput {
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Write),
            attributes: result.attributes,
        })
    }

    async fn query(&self, input: QueryInput) -> Result<PageOutput, Error> {
        let result = self
            .query()
            .table_name(&input.table_name)
            .set_index_name(input.index_name)
            .key_condition_expression(input.key_condition_expression)
            .set_filter_expression(input.filter_expression)
            .set_expression_attribute_names(input.attributes.names_opt())
            .set_expression_attribute_values(input.attributes.values_opt())
            .set_limit(input.limit)
            .set_exclusive_start_key(input.exclusive_start_key)
            .scan_index_forward(input.scan_forward)
            .consistent_read(input.consistent_read)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| Error::from_sdk("Query", &input.table_name, OperationKind::Query, e))?;

        Ok(PageOutput {
            count: result.count.max(0) as usize,
            scanned_count: result.scanned_count.max(0) as usize,
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Read),
            items: result.items.unwrap_or_default(),
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<PageOutput, Error> {
        let result = self
            .scan()
            .table_name(&input.table_name)
            .set_index_name(input.index_name)
            .set_filter_expression(input.filter_expression)
            .set_expression_attribute_names(input.attributes.names_opt())
            .set_expression_attribute_values(input.attributes.values_opt())
            .set_limit(input.limit)
            .set_exclusive_start_key(input.exclusive_start_key)
            .consistent_read(input.consistent_read)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| Error::from_sdk("Scan", &input.table_name, OperationKind::Scan, e))?;

        Ok(PageOutput {
            count: result.count.max(0) as usize,
            scanned_count: result.scanned_count.max(0) as usize,
            consumed: capacity(result.consumed_capacity.as_ref(), Side::Read),
            items: result.items.unwrap_or_default(),
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn batch_get_item(&self, input: BatchGetInput) -> Result<BatchGetChunkOutput, Error> {
        let keys = KeysAndAttributes::builder()
            .set_keys(Some(input.keys))
            .consistent_read(input.consistent_read)
            .build()?;

        let result = self
            .batch_get_item()
            .request_items(&input.table_name, keys)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                Error::from_sdk("BatchGetItem", &input.table_name, OperationKind::BatchGet, e)
            })?;

        let mut output = BatchGetChunkOutput {
            consumed: capacity_sum(result.consumed_capacity.as_deref(), Side::Read),
            ..Default::default()
        };
        if let Some(responses) = result.responses {
            for items in responses.into_values() {
                output.items.extend(items);
            }
        }
        if let Some(unprocessed) = result.unprocessed_keys {
            for keys_attrs in unprocessed.into_values() {
                output.unprocessed_keys.extend(keys_attrs.keys);
            }
        }
        Ok(output)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteInput,
    ) -> Result<BatchWriteChunkOutput, Error> {
        let mut requests = Vec::with_capacity(input.requests.len());
        for op in input.requests {
            let request = match op {
                WriteOp::Put(item) => WriteRequest::builder()
                    .put_request(PutRequest::builder().set_item(Some(item)).build()?)
                    .build(),
                WriteOp::Delete(key) => WriteRequest::builder()
                    .delete_request(DeleteRequest::builder().set_key(Some(key)).build()?)
                    .build(),
            };
            requests.push(request);
        }

        let result = self
            .batch_write_item()
            .request_items(&input.table_name, requests)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| {
                Error::from_sdk(
                    "BatchWriteItem",
                    &input.table_name,
                    OperationKind::BatchWrite,
                    e,
                )
            })?;

        let mut output = BatchWriteChunkOutput {
            consumed: capacity_sum(result.consumed_capacity.as_deref(), Side::Write),
            ..Default::default()
        };
        if let Some(unprocessed) = result.unprocessed_items {
            for request in unprocessed.into_values().flatten() {
                if let Some(put) = request.put_request {
                    output.unprocessed.push(WriteOp::Put(put.item));
                }
                if let Some(delete) = request.delete_request {
                    output.unprocessed.push(WriteOp::Delete(delete.key));
                }
            }
        }
        Ok(output)
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteInput,
    ) -> Result<TransactWriteOutput, Error> {
        let table = input
            .items
            .first()
            .map(|op| table_of(op).to_string())
            .unwrap_or_default();
        let items = input
            .items
            .into_iter()
            .map(transact_write_item)
            .collect::<Result<Vec<_>, _>>()?;

        let result = self
            .transact_write_items()
            .set_transact_items(Some(items))
            .set_client_request_token(input.client_request_token)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|err| {
                if let Some(TransactWriteItemsError::TransactionCanceledException(e)) =
                    err.as_service_error()
                {
                    return Error::TransactionCanceled {
                        reasons: cancellation_reasons(e.cancellation_reasons()),
                    };
                }
                Error::from_sdk(
                    "TransactWriteItems",
                    &table,
                    OperationKind::TransactWrite,
                    err,
                )
            })?;

        Ok(TransactWriteOutput {
            consumed: capacity_sum(result.consumed_capacity.as_deref(), Side::Write),
        })
    }

    async fn transact_get_items(
        &self,
        input: TransactGetInput,
    ) -> Result<TransactGetOutput, Error> {
        let table = input
            .items
            .first()
            .map(|op| op.table_name.clone())
            .unwrap_or_default();
        let items = input
            .items
            .into_iter()
            .map(|op| {
                let get = Get::builder()
                    .table_name(op.table_name)
                    .set_key(Some(op.key))
                    .build()?;
                Ok(TransactGetItem::builder().get(get).build())
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let result = self
            .transact_get_items()
            .set_transact_items(Some(items))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|err| {
                if let Some(TransactGetItemsError::TransactionCanceledException(e)) =
                    err.as_service_error()
                {
                    return Error::TransactionCanceled {
                        reasons: cancellation_reasons(e.cancellation_reasons()),
                    };
                }
                Error::from_sdk("TransactGetItems", &table, OperationKind::TransactGet, err)
            })?;

        Ok(TransactGetOutput {
            consumed: capacity_sum(result.consumed_capacity.as_deref(), Side::Read),
            items: result
                .responses
                .unwrap_or_default()
                .into_iter()
                .map(|response| response.item)
                .collect(),
        })
    }
}
