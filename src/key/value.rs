use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// Scalar type a key attribute may hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// `S`
    String,
    /// `N`
    Number,
    /// `B`
    Binary,
}

impl KeyType {
    /// DynamoDB type descriptor
    pub fn descriptor(self) -> &'static str {
        match self {
            KeyType::String => "S",
            KeyType::Number => "N",
            KeyType::Binary => "B",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

/// A single typed key element
///
/// Numbers are kept in DynamoDB's decimal text form so that no precision is
/// lost on the way to the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// String element
    S(String),
    /// Number element
    N(String),
    /// Binary element
    B(Vec<u8>),
}

impl KeyValue {
    /// Type of this element
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::S(_) => KeyType::String,
            KeyValue::N(_) => KeyType::Number,
            KeyValue::B(_) => KeyType::Binary,
        }
    }

    /// String content, if this is a string element
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Convert into the store attribute representation
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            KeyValue::S(s) => AttributeValue::S(s.clone()),
            KeyValue::N(n) => AttributeValue::N(n.clone()),
            KeyValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
        }
    }

    /// Convert from a store attribute, rejecting non-key types
    pub fn from_attribute_value(value: &AttributeValue, position: usize) -> Result<Self, Error> {
        match value {
            AttributeValue::S(s) => Ok(KeyValue::S(s.clone())),
            AttributeValue::N(n) => Ok(KeyValue::N(n.clone())),
            AttributeValue::B(b) => Ok(KeyValue::B(b.as_ref().to_vec())),
            AttributeValue::Null(_) => Err(Error::InvalidKey {
                position,
                reason: "null is not a valid key value".to_string(),
            }),
            other => Err(Error::InvalidKey {
                position,
                reason: format!("unsupported key attribute type {other:?}"),
            }),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::S(s) => f.write_str(s),
            KeyValue::N(n) => f.write_str(n),
            KeyValue::B(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::S(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::S(value)
    }
}

impl From<&String> for KeyValue {
    fn from(value: &String) -> Self {
        KeyValue::S(value.clone())
    }
}

impl From<Vec<u8>> for KeyValue {
    fn from(value: Vec<u8>) -> Self {
        KeyValue::B(value)
    }
}

macro_rules! impl_number_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyValue {
                fn from(value: $ty) -> Self {
                    KeyValue::N(value.to_string())
                }
            }
        )*
    };
}

impl_number_key!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, isize, usize, f32, f64);

/// Ordered, immutable tuple of typed key elements
///
/// A scalar key is a tuple of length one. Multi-attribute keys map each
/// element onto its own attribute, so no separator or escaping is involved
/// and numeric/binary ordering is preserved for range conditions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(Vec<KeyValue>);

impl Key {
    /// Single element key
    pub fn single(value: impl Into<KeyValue>) -> Self {
        Key(vec![value.into()])
    }

    /// Multi element key from values that are all present
    ///
    /// An empty iterator yields an empty key, which fails shape validation.
    pub fn tuple<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<KeyValue>,
    {
        Key(values.into_iter().map(Into::into).collect())
    }

    /// Multi element key from optional parts
    ///
    /// A missing part is a programming error and is reported with its
    /// position instead of being stringified.
    pub fn try_tuple<I>(values: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Option<KeyValue>>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(position, value)| {
                value.ok_or_else(|| Error::InvalidKey {
                    position,
                    reason: "key part is missing".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .and_then(|values| {
                if values.is_empty() {
                    Err(Error::InvalidKey {
                        position: 0,
                        reason: "a key needs at least one part".to_string(),
                    })
                } else {
                    Ok(Key(values))
                }
            })
    }

    /// Elements in order
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no elements
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Type sequence, e.g. `[S, N]`
    pub fn shape(&self) -> String {
        let types: Vec<&str> = self.0.iter().map(|v| v.key_type().descriptor()).collect();
        format!("[{}]", types.join(", "))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{single}");
        }
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "({})", parts.join(", "))
    }
}

impl From<KeyValue> for Key {
    fn from(value: KeyValue) -> Self {
        Key(vec![value])
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::single(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::single(value)
    }
}

/// Full primary key of one item
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// Partition key
    pub partition: Key,
    /// Sort key, required when the table declares one
    pub sort: Option<Key>,
}

impl ItemKey {
    /// Key for a table without sort key
    pub fn new(partition: impl Into<Key>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    /// Attach a sort key
    pub fn with_sort(mut self, sort: impl Into<Key>) -> Self {
        self.sort = Some(sort.into());
        self
    }
}
