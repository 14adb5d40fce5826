use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::Error;
use crate::key::value::{ItemKey, Key, KeyType, KeyValue};

/// Maximum number of attributes in one half of a multi-attribute key
pub const MAX_KEY_ATTRIBUTES: usize = 4;

/// Name and type of one key attribute
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAttribute {
    /// Attribute name on the item
    pub name: String,
    /// Scalar type stored in the attribute
    pub key_type: KeyType,
}

impl KeyAttribute {
    /// String typed attribute
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::String,
        }
    }

    /// Number typed attribute
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::Number,
        }
    }

    /// Binary typed attribute
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_type: KeyType::Binary,
        }
    }
}

impl fmt::Display for KeyAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.key_type)
    }
}

/// Declared key layout of a table or secondary index
///
/// Only used for validation and for mapping tuple keys onto attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShape {
    /// Partition key attributes, in order
    pub partition_key: Vec<KeyAttribute>,
    /// Sort key attributes, in order; empty when there is no sort key
    #[serde(default)]
    pub sort_key: Vec<KeyAttribute>,
}

/// Outcome of a failed shape comparison, before pattern context is attached
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ShapeMismatch {
    pub(crate) expected: String,
    pub(crate) actual: String,
}

fn describe(attributes: &[KeyAttribute]) -> String {
    let parts: Vec<String> = attributes.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn types_match(attributes: &[KeyAttribute], values: &[KeyValue]) -> bool {
    attributes
        .iter()
        .zip(values)
        .all(|(attribute, value)| attribute.key_type == value.key_type())
}

impl IndexShape {
    /// Shape with a partition key only
    pub fn new(partition_key: impl IntoIterator<Item = KeyAttribute>) -> Self {
        Self {
            partition_key: partition_key.into_iter().collect(),
            sort_key: Vec::new(),
        }
    }

    /// Set the sort key attributes
    pub fn with_sort_key(mut self, sort_key: impl IntoIterator<Item = KeyAttribute>) -> Self {
        self.sort_key = sort_key.into_iter().collect();
        self
    }

    /// Check arity limits of the declaration itself
    pub fn validate(&self) -> Result<(), Error> {
        if self.partition_key.is_empty() {
            return Err(Error::validation("index shape needs a partition key"));
        }
        if self.partition_key.len() > MAX_KEY_ATTRIBUTES || self.sort_key.len() > MAX_KEY_ATTRIBUTES
        {
            return Err(Error::validation(format!(
                "index shape allows at most {MAX_KEY_ATTRIBUTES} attributes per key half"
            )));
        }
        Ok(())
    }

    /// Partition keys must match arity and per-position type exactly
    pub(crate) fn check_partition(&self, key: &Key) -> Result<(), ShapeMismatch> {
        if key.len() == self.partition_key.len() && types_match(&self.partition_key, key.values())
        {
            Ok(())
        } else {
            Err(ShapeMismatch {
                expected: describe(&self.partition_key),
                actual: key.shape(),
            })
        }
    }

    /// Sort keys may be an ordered prefix of the declared attributes
    pub(crate) fn check_sort_prefix(&self, key: &Key) -> Result<(), ShapeMismatch> {
        if !key.is_empty()
            && key.len() <= self.sort_key.len()
            && types_match(&self.sort_key, key.values())
        {
            Ok(())
        } else {
            Err(ShapeMismatch {
                expected: describe(&self.sort_key),
                actual: key.shape(),
            })
        }
    }

    /// Encode a full primary key into item attributes
    pub fn encode_item_key(&self, key: &ItemKey) -> Result<HashMap<String, AttributeValue>, Error> {
        let mut item = encode_key(&self.partition_key, &key.partition)?;
        match (&key.sort, self.sort_key.is_empty()) {
            (Some(sort), false) => item.extend(encode_key(&self.sort_key, sort)?),
            (None, true) => {}
            (Some(_), true) => {
                return Err(Error::validation("sort key given but none is declared"));
            }
            (None, false) => {
                return Err(Error::validation(format!(
                    "sort key {} is required",
                    describe(&self.sort_key)
                )));
            }
        }
        Ok(item)
    }

    /// Extract the primary key of an item
    pub fn decode_item_key(&self, item: &HashMap<String, AttributeValue>) -> Result<ItemKey, Error> {
        let partition = decode_key(&self.partition_key, item)?;
        let sort = if self.sort_key.is_empty() {
            None
        } else {
            Some(decode_key(&self.sort_key, item)?)
        };
        Ok(ItemKey { partition, sort })
    }
}

/// Write a complete key tuple into one attribute per element
///
/// Every declared attribute must be supplied, with the declared type.
pub fn encode_key(
    attributes: &[KeyAttribute],
    key: &Key,
) -> Result<HashMap<String, AttributeValue>, Error> {
    if key.len() != attributes.len() {
        return Err(Error::validation(format!(
            "key {} does not cover {}",
            key.shape(),
            describe(attributes)
        )));
    }

    let mut item = HashMap::with_capacity(attributes.len());
    for (position, (attribute, value)) in attributes.iter().zip(key.values()).enumerate() {
        if attribute.key_type != value.key_type() {
            return Err(Error::InvalidKey {
                position,
                reason: format!(
                    "attribute `{}` expects {} but got {}",
                    attribute.name,
                    attribute.key_type,
                    value.key_type()
                ),
            });
        }
        let _ = item.insert(attribute.name.clone(), value.to_attribute_value());
    }
    Ok(item)
}

/// Read a key tuple back out of an item, in declared attribute order
pub fn decode_key(
    attributes: &[KeyAttribute],
    item: &HashMap<String, AttributeValue>,
) -> Result<Key, Error> {
    let values = attributes
        .iter()
        .enumerate()
        .map(|(position, attribute)| {
            let value = item.get(&attribute.name).ok_or_else(|| Error::InvalidKey {
                position,
                reason: format!("attribute `{}` is missing", attribute.name),
            })?;
            let value = KeyValue::from_attribute_value(value, position)?;
            if value.key_type() != attribute.key_type {
                return Err(Error::InvalidKey {
                    position,
                    reason: format!(
                        "attribute `{}` holds {} instead of {}",
                        attribute.name,
                        value.key_type(),
                        attribute.key_type
                    ),
                });
            }
            Ok(value)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Key::tuple(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenant_shape() -> IndexShape {
        IndexShape::new([KeyAttribute::string("tenantId"), KeyAttribute::string("userId")])
            .with_sort_key([KeyAttribute::number("year"), KeyAttribute::string("orderId")])
    }

    #[test]
    fn test_partition_requires_exact_arity() {
        let shape = tenant_shape();
        assert!(shape.check_partition(&Key::tuple(["T1", "U1"])).is_ok());

        let mismatch = shape.check_partition(&Key::single("T1")).unwrap_err();
        assert_eq!(mismatch.expected, "[tenantId:S, userId:S]");
        assert_eq!(mismatch.actual, "[S]");
    }

    #[test]
    fn test_sort_accepts_ordered_prefix_only() {
        let shape = tenant_shape();
        assert!(shape.check_sort_prefix(&Key::single(2024)).is_ok());
        assert!(
            shape
                .check_sort_prefix(&Key::tuple([KeyValue::from(2024), KeyValue::from("O1")]))
                .is_ok()
        );
        assert!(shape.check_sort_prefix(&Key::single("O1")).is_err());
        assert!(
            shape
                .check_sort_prefix(&Key::tuple([
                    KeyValue::from(2024),
                    KeyValue::from("O1"),
                    KeyValue::from("extra"),
                ]))
                .is_err()
        );
    }

    #[test]
    fn test_encode_decode_multi_attribute_key() {
        let shape = tenant_shape();
        let key = ItemKey::new(Key::tuple(["T1", "U1"]))
            .with_sort(Key::tuple([KeyValue::from(2024), KeyValue::from("O1")]));

        let item = shape.encode_item_key(&key).unwrap();
        assert_eq!(item.get("year"), Some(&AttributeValue::N("2024".into())));
        assert_eq!(shape.decode_item_key(&item).unwrap(), key);
    }

    #[test]
    fn test_encode_requires_declared_sort_key() {
        let shape = tenant_shape();
        let err = shape
            .encode_item_key(&ItemKey::new(Key::tuple(["T1", "U1"])))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_shape_arity_limits() {
        let too_wide = IndexShape::new((0..5).map(|i| KeyAttribute::string(format!("p{i}"))));
        assert!(too_wide.validate().is_err());
        assert!(IndexShape::new([]).validate().is_err());
        assert!(tenant_shape().validate().is_ok());
    }

    fn attributes(prefix: &str, count: usize) -> Vec<KeyAttribute> {
        (0..count)
            .map(|i| KeyAttribute::number(format!("{prefix}{i}")))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_validate_checks_both_arities(partition in 0usize..8, sort in 0usize..8) {
            let shape = IndexShape::new(attributes("p", partition))
                .with_sort_key(attributes("s", sort));

            let valid = (1..=MAX_KEY_ATTRIBUTES).contains(&partition) && sort <= MAX_KEY_ATTRIBUTES;
            prop_assert_eq!(shape.validate().is_ok(), valid);
            if !valid {
                prop_assert!(shape.validate().unwrap_err().is_validation());
            }
        }
    }
}
