use serde::{Serialize, de::DeserializeOwned};
use serde_dynamo::{from_item, to_item};

use crate::Error;
use crate::key::ItemKey;
use crate::pattern::{
    AD_HOC_QUERY, Condition, ExpressionAttributes, ExpressionBuilder, Params, ResolvedPattern,
    UpdateAction, check_key_condition,
};
use crate::stats::OperationKind;
use crate::store::{
    CompiledExpression, DeleteItemInput, GetItemInput, Item, PageOutput, PutItemInput, QueryInput,
    ScanInput, StoreClient, UpdateItemInput,
};
use crate::table::{PageOptions, Query, Scan, Table};

/// Validate and compile a standalone condition expression
pub(super) fn compile_condition(condition: &Condition) -> Result<CompiledExpression, Error> {
    condition.validate()?;
    let mut builder = ExpressionBuilder::new();
    let expression = builder.condition(condition);
    Ok(CompiledExpression {
        expression,
        attributes: builder.finish(),
    })
}

/// Update and optional condition expressions sharing one placeholder space
pub(super) fn compile_update(
    actions: &[UpdateAction],
    condition: Option<&Condition>,
) -> Result<(String, Option<String>, ExpressionAttributes), Error> {
    if actions.is_empty() {
        return Err(Error::validation("an update needs at least one action"));
    }
    if let Some(condition) = condition {
        condition.validate()?;
    }
    let mut builder = ExpressionBuilder::new();
    let update = builder.update(actions);
    let condition = condition.map(|c| builder.condition(c));
    Ok((update, condition, builder.finish()))
}

/// How many items one page returned, and how many the store evaluated
fn page_counts(page: &PageOutput) -> (usize, usize) {
    (page.count, page.scanned_count)
}

impl<C: StoreClient> Table<C> {
    /// Read one item by primary key
    pub async fn get(&self, key: &ItemKey, consistent_read: bool) -> Result<Option<Item>, Error> {
        let observation = self
            .observe(OperationKind::Get)
            .annotate(|r| r.with_partition_key(&key.partition));

        let result = async {
            let input = GetItemInput {
                table_name: self.schema.table_name.clone(),
                key: self.schema.primary_key.encode_item_key(key)?,
                consistent_read,
            };
            self.client.get_item(input).await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record
                .with_capacity(output.consumed)
                .with_items(usize::from(output.item.is_some()))
        });
        result.map(|output| output.item)
    }

    /// [`Table::get`] deserialized with `serde_dynamo`
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        key: &ItemKey,
        consistent_read: bool,
    ) -> Result<Option<T>, Error> {
        match self.get(key, consistent_read).await? {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }

    /// Write a full item, optionally guarded by a condition
    ///
    /// The item must carry every primary key attribute with its declared type.
    pub async fn put(&self, item: Item, condition: Option<&Condition>) -> Result<(), Error> {
        let key = self.schema.primary_key.decode_item_key(&item);
        let observation = self.observe(OperationKind::Put).annotate(|r| match &key {
            Ok(key) => r.with_partition_key(&key.partition),
            Err(_) => r,
        });

        let result = async {
            let _ = key?;
            let input = PutItemInput {
                table_name: self.schema.table_name.clone(),
                item,
                condition: condition.map(compile_condition).transpose()?,
            };
            self.client.put_item(input).await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record.with_capacity(output.consumed).with_items(1)
        });
        result.map(|_| ())
    }

    /// [`Table::put`] of a value serialized with `serde_dynamo`
    pub async fn put_as<T: Serialize>(
        &self,
        value: &T,
        condition: Option<&Condition>,
    ) -> Result<(), Error> {
        let item: Item = to_item(value)?;
        self.put(item, condition).await
    }

    /// Apply update actions and return the item as it is afterwards
    pub async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
    ) -> Result<Option<Item>, Error> {
        let observation = self
            .observe(OperationKind::Update)
            .annotate(|r| r.with_partition_key(&key.partition));

        let result = async {
            let (update_expression, condition_expression, attributes) =
                compile_update(actions, condition)?;
            let input = UpdateItemInput {
                table_name: self.schema.table_name.clone(),
                key: self.schema.primary_key.encode_item_key(key)?,
                update_expression,
                condition_expression,
                attributes,
            };
            self.client.update_item(input).await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record.with_capacity(output.consumed).with_items(1)
        });
        result.map(|output| output.attributes)
    }

    /// Delete one item, optionally guarded by a condition
    pub async fn delete(&self, key: &ItemKey, condition: Option<&Condition>) -> Result<(), Error> {
        let observation = self
            .observe(OperationKind::Delete)
            .annotate(|r| r.with_partition_key(&key.partition));

        let result = async {
            let input = DeleteItemInput {
                table_name: self.schema.table_name.clone(),
                key: self.schema.primary_key.encode_item_key(key)?,
                condition: condition.map(compile_condition).transpose()?,
            };
            self.client.delete_item(input).await
        }
        .await;

        self.complete(observation, &result, |record, output| {
            record.with_capacity(output.consumed).with_items(1)
        });
        result.map(|_| ())
    }

    fn query_input(&self, query: &Query) -> Result<QueryInput, Error> {
        let index_name = query.index_name.as_deref();
        let shape = self.registry.shape_for(index_name)?;
        check_key_condition(AD_HOC_QUERY, index_name, shape, &query.key_condition)?;
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }

        let mut builder = ExpressionBuilder::new();
        let key_condition_expression = builder.key_condition(shape, &query.key_condition)?;
        let filter_expression = query.filter.as_ref().map(|f| builder.condition(f));

        Ok(QueryInput {
            table_name: self.schema.table_name.clone(),
            index_name: query.index_name.clone(),
            key_condition_expression,
            filter_expression,
            attributes: builder.finish(),
            limit: query.page.limit,
            exclusive_start_key: query.page.exclusive_start_key.clone(),
            scan_forward: !query.page.descending,
            consistent_read: query.page.consistent_read,
        })
    }

    /// Follow `last_evaluated_key` until the last page, merging the pages
    async fn query_pages(&self, mut input: QueryInput) -> Result<(PageOutput, usize), Error> {
        let mut merged = PageOutput::default();
        let mut pages = 0;
        loop {
            let page = self.client.query(input.clone()).await?;
            pages += 1;
            merged.count += page.count;
            merged.scanned_count += page.scanned_count;
            merged.consumed += page.consumed;
            merged.items.extend(page.items);
            match page.last_evaluated_key {
                Some(cursor) => input.exclusive_start_key = Some(cursor),
                None => break,
            }
        }
        tracing::debug!(table = %self.schema.table_name, pages, items = merged.count, "query drained");
        Ok((merged, pages))
    }

    /// One page of a query
    ///
    /// Key conditions on an index are checked against the shape registered
    /// for it; indexes without a registered shape are rejected.
    pub async fn query(&self, query: &Query) -> Result<PageOutput, Error> {
        let observation = self.observe(OperationKind::Query).annotate(|r| {
            r.on_index(query.index_name.as_deref())
                .with_partition_key(&query.key_condition.partition)
        });

        let result = async {
            let input = self.query_input(query)?;
            self.client.query(input).await
        }
        .await;

        self.complete(observation, &result, |record, page| {
            let (items, scanned) = page_counts(page);
            record
                .with_capacity(page.consumed)
                .with_items(items)
                .with_scanned(scanned)
        });
        result
    }

    /// Every page of a query, starting at `query.page`
    ///
    /// The merged output has no cursor. Recorded as one operation.
    pub async fn query_all(&self, query: &Query) -> Result<PageOutput, Error> {
        let observation = self.observe(OperationKind::Query).annotate(|r| {
            r.on_index(query.index_name.as_deref())
                .with_partition_key(&query.key_condition.partition)
        });

        let result = async {
            let input = self.query_input(query)?;
            self.query_pages(input).await
        }
        .await;

        self.complete(observation, &result, |record, (page, pages)| {
            record
                .with_capacity(page.consumed)
                .with_items(page.count)
                .with_scanned(page.scanned_count)
                .with_metadata("pages", pages.to_string())
        });
        result.map(|(page, _)| page)
    }

    /// One page of a scan
    pub async fn scan(&self, scan: &Scan) -> Result<PageOutput, Error> {
        let observation = self
            .observe(OperationKind::Scan)
            .annotate(|r| r.on_index(scan.index_name.as_deref()));

        let result = async {
            let mut builder = ExpressionBuilder::new();
            let filter_expression = match &scan.filter {
                Some(filter) => {
                    filter.validate()?;
                    Some(builder.condition(filter))
                }
                None => None,
            };
            let input = ScanInput {
                table_name: self.schema.table_name.clone(),
                index_name: scan.index_name.clone(),
                filter_expression,
                attributes: builder.finish(),
                limit: scan.page.limit,
                exclusive_start_key: scan.page.exclusive_start_key.clone(),
                consistent_read: scan.page.consistent_read,
            };
            self.client.scan(input).await
        }
        .await;

        self.complete(observation, &result, |record, page| {
            let (items, scanned) = page_counts(page);
            record
                .with_capacity(page.consumed)
                .with_items(items)
                .with_scanned(scanned)
        });
        result
    }

    /// Run a registered access pattern to completion and apply its transform
    pub async fn execute_pattern(&self, name: &str, params: &Params) -> Result<Vec<Item>, Error> {
        let observation = self
            .observe(OperationKind::Query)
            .annotate(|r| r.for_pattern(name));

        let result = async {
            let resolved = self.registry.resolve(name, params)?;
            let input = self.pattern_input(&resolved, &PageOptions::default())?;
            let (page, pages) = self.query_pages(input).await?;
            Ok::<_, Error>((resolved, page, pages))
        }
        .await;

        self.complete(observation, &result, |record, (resolved, page, pages)| {
            record
                .on_index(resolved.index_name.as_deref())
                .with_partition_key(&resolved.key_condition.partition)
                .with_capacity(page.consumed)
                .with_items(page.count)
                .with_scanned(page.scanned_count)
                .with_metadata("pages", pages.to_string())
        });
        result.map(|(resolved, page, _)| resolved.transform(page.items))
    }

    /// One page of a registered access pattern
    ///
    /// The transform is applied to the page items; the cursor is kept so the
    /// caller can continue with [`PageOptions::start_after`].
    pub async fn execute_pattern_with(
        &self,
        name: &str,
        params: &Params,
        page: &PageOptions,
    ) -> Result<PageOutput, Error> {
        let observation = self
            .observe(OperationKind::Query)
            .annotate(|r| r.for_pattern(name));

        let result = async {
            let resolved = self.registry.resolve(name, params)?;
            let input = self.pattern_input(&resolved, page)?;
            let output = self.client.query(input).await?;
            Ok::<_, Error>((resolved, output))
        }
        .await;

        self.complete(observation, &result, |record, (resolved, output)| {
            let (items, scanned) = page_counts(output);
            record
                .on_index(resolved.index_name.as_deref())
                .with_partition_key(&resolved.key_condition.partition)
                .with_capacity(output.consumed)
                .with_items(items)
                .with_scanned(scanned)
        });
        result.map(|(resolved, mut output)| {
            output.items = resolved.transform(output.items);
            output
        })
    }

    fn pattern_input(
        &self,
        resolved: &ResolvedPattern,
        page: &PageOptions,
    ) -> Result<QueryInput, Error> {
        let mut builder = ExpressionBuilder::new();
        let key_condition_expression =
            builder.key_condition(&resolved.shape, &resolved.key_condition)?;
        let filter_expression = resolved.filter.as_ref().map(|f| builder.condition(f));

        Ok(QueryInput {
            table_name: self.schema.table_name.clone(),
            index_name: resolved.index_name.clone(),
            key_condition_expression,
            filter_expression,
            attributes: builder.finish(),
            limit: page.limit,
            exclusive_start_key: page.exclusive_start_key.clone(),
            scan_forward: !page.descending,
            consistent_read: page.consistent_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;

    #[test]
    fn test_update_shares_placeholders_with_condition() {
        let (update, condition, attributes) = compile_update(
            &[UpdateAction::Set("status".into(), AttributeValue::S("shipped".into()))],
            Some(&Condition::eq("status", AttributeValue::S("paid".into()))),
        )
        .unwrap();
        assert_eq!(update, "SET #n0 = :v0");
        assert_eq!(condition.as_deref(), Some("#n0 = :v1"));
        assert_eq!(attributes.names.len(), 1);
        assert_eq!(attributes.values.len(), 2);
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(compile_update(&[], None).unwrap_err().is_validation());
    }

    #[test]
    fn test_invalid_condition_rejected_before_compiling() {
        let err = compile_condition(&Condition::And(vec![])).unwrap_err();
        assert!(err.is_validation());
    }
}
