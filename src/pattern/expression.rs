use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::Error;
use crate::key::{IndexShape, Key, KeyAttribute, KeyValue};
use crate::pattern::condition::{Comparison, Condition, KeyCondition, SortCondition, UpdateAction};

/// Placeholder maps shared by every expression of one request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionAttributes {
    /// `#nN` -> attribute name
    pub names: HashMap<String, String>,
    /// `:vN` -> value
    pub values: HashMap<String, AttributeValue>,
}

impl ExpressionAttributes {
    /// Names map, `None` when empty (the store rejects empty maps)
    pub fn names_opt(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Values map, `None` when empty
    pub fn values_opt(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

/// Builds expression strings with name and value placeholders
///
/// Every attribute name goes through a `#nN` placeholder, so reserved words
/// never need special casing.
#[derive(Debug, Default)]
pub(crate) struct ExpressionBuilder {
    attributes: ExpressionAttributes,
    placeholders: HashMap<String, String>,
}

impl ExpressionBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn name(&mut self, attribute: &str) -> String {
        if let Some(placeholder) = self.placeholders.get(attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.placeholders.len());
        let _ = self
            .placeholders
            .insert(attribute.to_string(), placeholder.clone());
        let _ = self
            .attributes
            .names
            .insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn value(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.attributes.values.len());
        let _ = self.attributes.values.insert(placeholder.clone(), value);
        placeholder
    }

    fn key_equalities(&mut self, attributes: &[KeyAttribute], values: &[KeyValue]) -> Vec<String> {
        attributes
            .iter()
            .zip(values)
            .map(|(attribute, value)| {
                let name = self.name(&attribute.name);
                let value = self.value(value.to_attribute_value());
                format!("{name} = {value}")
            })
            .collect()
    }

    /// Last element of a sort prefix together with its attribute
    fn split_last<'k>(
        &mut self,
        shape: &IndexShape,
        key: &'k Key,
        clauses: &mut Vec<String>,
    ) -> Result<(String, &'k KeyValue), Error> {
        let (last, prefix) = key
            .values()
            .split_last()
            .ok_or_else(|| Error::validation("sort key condition is empty"))?;
        let attribute = shape.sort_key.get(prefix.len()).ok_or_else(|| {
            Error::validation(format!(
                "sort key condition has {} elements, index sort key has {}",
                key.len(),
                shape.sort_key.len()
            ))
        })?;
        clauses.extend(self.key_equalities(&shape.sort_key, prefix));
        let name = self.name(&attribute.name);
        Ok((name, last))
    }

    fn sort_compare(
        &mut self,
        shape: &IndexShape,
        key: &Key,
        comparison: Comparison,
        clauses: &mut Vec<String>,
    ) -> Result<(), Error> {
        let (name, last) = self.split_last(shape, key, clauses)?;
        let value = self.value(last.to_attribute_value());
        clauses.push(format!("{name} {} {value}", comparison.symbol()));
        Ok(())
    }

    /// Key condition expression; the key must already match `shape`
    pub(crate) fn key_condition(
        &mut self,
        shape: &IndexShape,
        condition: &KeyCondition,
    ) -> Result<String, Error> {
        let mut clauses = self.key_equalities(&shape.partition_key, condition.partition.values());

        match &condition.sort {
            None => {}
            Some(SortCondition::Eq(key)) => {
                clauses.extend(self.key_equalities(&shape.sort_key, key.values()));
            }
            Some(SortCondition::Between(low, high)) => {
                let (name, low_last) = self.split_last(shape, low, &mut clauses)?;
                let low = self.value(low_last.to_attribute_value());
                let high_last = high
                    .values()
                    .last()
                    .ok_or_else(|| Error::validation("between upper bound is empty"))?;
                let high = self.value(high_last.to_attribute_value());
                clauses.push(format!("{name} BETWEEN {low} AND {high}"));
            }
            Some(SortCondition::BeginsWith(key)) => {
                let (name, last) = self.split_last(shape, key, &mut clauses)?;
                let value = self.value(last.to_attribute_value());
                clauses.push(format!("begins_with({name}, {value})"));
            }
            Some(SortCondition::Lt(key)) => {
                self.sort_compare(shape, key, Comparison::Lt, &mut clauses)?;
            }
            Some(SortCondition::Le(key)) => {
                self.sort_compare(shape, key, Comparison::Le, &mut clauses)?;
            }
            Some(SortCondition::Gt(key)) => {
                self.sort_compare(shape, key, Comparison::Gt, &mut clauses)?;
            }
            Some(SortCondition::Ge(key)) => {
                self.sort_compare(shape, key, Comparison::Ge, &mut clauses)?;
            }
        }

        Ok(clauses.join(" AND "))
    }

    /// Filter or condition expression
    pub(crate) fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Compare(attr, comparison, value) => {
                let name = self.name(attr);
                let value = self.value(value.clone());
                format!("{name} {} {value}", comparison.symbol())
            }
            Condition::Between(attr, low, high) => {
                let name = self.name(attr);
                let low = self.value(low.clone());
                let high = self.value(high.clone());
                format!("{name} BETWEEN {low} AND {high}")
            }
            Condition::BeginsWith(attr, prefix) => {
                let name = self.name(attr);
                let value = self.value(AttributeValue::S(prefix.clone()));
                format!("begins_with({name}, {value})")
            }
            Condition::Contains(attr, value) => {
                let name = self.name(attr);
                let value = self.value(value.clone());
                format!("contains({name}, {value})")
            }
            Condition::Exists(attr) => format!("attribute_exists({})", self.name(attr)),
            Condition::NotExists(attr) => format!("attribute_not_exists({})", self.name(attr)),
            Condition::And(all) => self.group(all, " AND "),
            Condition::Or(any) => self.group(any, " OR "),
            Condition::Not(inner) => format!("NOT ({})", self.condition(inner)),
        }
    }

    fn group(&mut self, conditions: &[Condition], joiner: &str) -> String {
        let mut parts: Vec<String> = conditions.iter().map(|c| self.condition(c)).collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("({})", parts.join(joiner))
        }
    }

    /// Update expression, clauses grouped by action keyword
    pub(crate) fn update(&mut self, actions: &[UpdateAction]) -> String {
        let mut set = Vec::new();
        let mut add = Vec::new();
        let mut remove = Vec::new();

        for action in actions {
            match action {
                UpdateAction::Set(attr, value) => {
                    let name = self.name(attr);
                    let value = self.value(value.clone());
                    set.push(format!("{name} = {value}"));
                }
                UpdateAction::Add(attr, value) => {
                    let name = self.name(attr);
                    let value = self.value(value.clone());
                    add.push(format!("{name} {value}"));
                }
                UpdateAction::Remove(attr) => remove.push(self.name(attr)),
            }
        }

        let mut expression = Vec::new();
        if !set.is_empty() {
            expression.push(format!("SET {}", set.join(", ")));
        }
        if !add.is_empty() {
            expression.push(format!("ADD {}", add.join(", ")));
        }
        if !remove.is_empty() {
            expression.push(format!("REMOVE {}", remove.join(", ")));
        }
        expression.join(" ")
    }

    pub(crate) fn finish(self) -> ExpressionAttributes {
        self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_shape() -> IndexShape {
        IndexShape::new([KeyAttribute::string("tenantId"), KeyAttribute::string("userId")])
            .with_sort_key([KeyAttribute::number("year"), KeyAttribute::string("orderId")])
    }

    #[test]
    fn test_multi_attribute_key_condition() {
        let mut builder = ExpressionBuilder::new();
        let condition = KeyCondition::partition(Key::tuple(["T1", "U1"])).with_sort(
            SortCondition::BeginsWith(Key::tuple([KeyValue::from(2024), KeyValue::from("O-")])),
        );

        let expression = builder.key_condition(&orders_shape(), &condition).unwrap();
        assert_eq!(
            expression,
            "#n0 = :v0 AND #n1 = :v1 AND #n2 = :v2 AND begins_with(#n3, :v3)"
        );

        let attributes = builder.finish();
        assert_eq!(attributes.names["#n2"], "year");
        assert_eq!(attributes.values[":v2"], AttributeValue::N("2024".into()));
    }

    #[test]
    fn test_between_uses_last_elements() {
        let mut builder = ExpressionBuilder::new();
        let shape = IndexShape::new([KeyAttribute::string("pk")])
            .with_sort_key([KeyAttribute::number("ts")]);
        let condition = KeyCondition::partition("USER#1").sort_between(
            Key::single(KeyValue::from(10)),
            Key::single(KeyValue::from(20)),
        );

        assert_eq!(
            builder.key_condition(&shape, &condition).unwrap(),
            "#n0 = :v0 AND #n1 BETWEEN :v1 AND :v2"
        );
    }

    #[test]
    fn test_filter_shares_placeholders_with_key_condition() {
        let mut builder = ExpressionBuilder::new();
        let shape = IndexShape::new([KeyAttribute::string("pk")]);
        let _ = builder
            .key_condition(&shape, &KeyCondition::partition("USER#1"))
            .unwrap();

        let filter = Condition::eq("status", AttributeValue::S("open".into()))
            .or(Condition::not_exists("pk"));
        assert_eq!(
            builder.condition(&filter),
            "(#n1 = :v1 OR attribute_not_exists(#n0))"
        );
    }

    #[test]
    fn test_update_expression_groups_clauses() {
        let mut builder = ExpressionBuilder::new();
        let expression = builder.update(&[
            UpdateAction::Set("name".into(), AttributeValue::S("Jane".into())),
            UpdateAction::Add("visits".into(), AttributeValue::N("1".into())),
            UpdateAction::Remove("legacy".into()),
            UpdateAction::Set("status".into(), AttributeValue::S("active".into())),
        ]);
        assert_eq!(
            expression,
            "SET #n0 = :v0, #n3 = :v2 ADD #n1 :v1 REMOVE #n2"
        );
    }
}
