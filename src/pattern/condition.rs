use aws_sdk_dynamodb::types::AttributeValue;

use crate::Error;
use crate::key::Key;

/// Comparison operator used by [`Condition::Compare`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// Condition over the sort key of a query
///
/// The key is an ordered prefix of the sort key attributes. All elements but
/// the last are matched with equality, the operator applies to the last one.
#[derive(Clone, Debug, PartialEq)]
pub enum SortCondition {
    /// Every element equal
    Eq(Key),
    /// Last element `<`
    Lt(Key),
    /// Last element `<=`
    Le(Key),
    /// Last element `>`
    Gt(Key),
    /// Last element `>=`
    Ge(Key),
    /// Last element between two bounds, inclusive; prefixes must agree
    Between(Key, Key),
    /// Last element starts with the given string or bytes
    BeginsWith(Key),
}

impl SortCondition {
    /// Keys the condition carries, lower bound first
    pub fn keys(&self) -> Vec<&Key> {
        match self {
            SortCondition::Eq(k)
            | SortCondition::Lt(k)
            | SortCondition::Le(k)
            | SortCondition::Gt(k)
            | SortCondition::Ge(k)
            | SortCondition::BeginsWith(k) => vec![k],
            SortCondition::Between(low, high) => vec![low, high],
        }
    }
}

/// Key condition of a query: partition equality plus an optional sort condition
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition {
    /// Partition key, matched with equality on every element
    pub partition: Key,
    /// Optional sort key condition
    pub sort: Option<SortCondition>,
}

impl KeyCondition {
    /// All items of one partition
    pub fn partition(key: impl Into<Key>) -> Self {
        Self {
            partition: key.into(),
            sort: None,
        }
    }

    /// Restrict the sort key
    pub fn with_sort(mut self, sort: SortCondition) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sort key equals
    pub fn sort_eq(self, key: impl Into<Key>) -> Self {
        self.with_sort(SortCondition::Eq(key.into()))
    }

    /// Sort key begins with
    pub fn sort_begins_with(self, key: impl Into<Key>) -> Self {
        self.with_sort(SortCondition::BeginsWith(key.into()))
    }

    /// Sort key between, inclusive
    pub fn sort_between(self, low: impl Into<Key>, high: impl Into<Key>) -> Self {
        self.with_sort(SortCondition::Between(low.into(), high.into()))
    }
}

/// Filter or condition expression over item attributes
///
/// A closed set of variants so that structure can be checked before any
/// request is built. Attribute names refer to top-level attributes.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `attr <op> value`
    Compare(String, Comparison, AttributeValue),
    /// `attr BETWEEN low AND high`
    Between(String, AttributeValue, AttributeValue),
    /// `begins_with(attr, prefix)`
    BeginsWith(String, String),
    /// `contains(attr, value)`
    Contains(String, AttributeValue),
    /// `attribute_exists(attr)`
    Exists(String),
    /// `attribute_not_exists(attr)`
    NotExists(String),
    /// Every sub-condition holds
    And(Vec<Condition>),
    /// At least one sub-condition holds
    Or(Vec<Condition>),
    /// Negation
    Not(Box<Condition>),
}

/// Filters use the same closed set as conditions
pub type Filter = Condition;

impl Condition {
    /// `attr = value`
    pub fn eq(attr: impl Into<String>, value: AttributeValue) -> Self {
        Condition::Compare(attr.into(), Comparison::Eq, value)
    }

    /// `attr <> value`
    pub fn ne(attr: impl Into<String>, value: AttributeValue) -> Self {
        Condition::Compare(attr.into(), Comparison::Ne, value)
    }

    /// `attr < value`
    pub fn lt(attr: impl Into<String>, value: AttributeValue) -> Self {
        Condition::Compare(attr.into(), Comparison::Lt, value)
    }

    /// `attr >= value`
    pub fn ge(attr: impl Into<String>, value: AttributeValue) -> Self {
        Condition::Compare(attr.into(), Comparison::Ge, value)
    }

    /// `attribute_exists(attr)`
    pub fn exists(attr: impl Into<String>) -> Self {
        Condition::Exists(attr.into())
    }

    /// `attribute_not_exists(attr)`, the usual guard for create-only puts
    pub fn not_exists(attr: impl Into<String>) -> Self {
        Condition::NotExists(attr.into())
    }

    /// Conjunction with another condition, flattening nested `And`s
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut all) => {
                all.push(other);
                Condition::And(all)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    /// Disjunction with another condition, flattening nested `Or`s
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut any) => {
                any.push(other);
                Condition::Or(any)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    /// Structural check: names are non-empty and logical groups are not empty
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Condition::Compare(attr, ..)
            | Condition::Between(attr, ..)
            | Condition::Contains(attr, _)
            | Condition::Exists(attr)
            | Condition::NotExists(attr) => check_attribute(attr),
            Condition::BeginsWith(attr, prefix) => {
                check_attribute(attr)?;
                if prefix.is_empty() {
                    return Err(Error::validation(format!(
                        "begins_with on `{attr}` needs a non-empty prefix"
                    )));
                }
                Ok(())
            }
            Condition::And(all) | Condition::Or(all) => {
                if all.is_empty() {
                    return Err(Error::validation("logical condition group is empty"));
                }
                all.iter().try_for_each(Condition::validate)
            }
            Condition::Not(inner) => inner.validate(),
        }
    }
}

fn check_attribute(attr: &str) -> Result<(), Error> {
    if attr.is_empty() {
        Err(Error::validation("condition attribute name is empty"))
    } else {
        Ok(())
    }
}

/// One clause of an update expression
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateAction {
    /// `SET attr = value`
    Set(String, AttributeValue),
    /// `ADD attr value` (numeric increment or set union)
    Add(String, AttributeValue),
    /// `REMOVE attr`
    Remove(String),
}
