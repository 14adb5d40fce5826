use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::Error;
use crate::error::KeyRole;
use crate::key::{IndexShape, Key, KeyType, KeyValue, ShapeMismatch};
use crate::pattern::condition::{Condition, KeyCondition, SortCondition};
use crate::store::Item;

/// Builds the key condition of a pattern from call parameters
pub type KeyConditionFn = Arc<dyn Fn(&Params) -> Result<KeyCondition, Error> + Send + Sync>;
/// Builds the optional filter of a pattern from call parameters
pub type FilterFn = Arc<dyn Fn(&Params) -> Result<Option<Condition>, Error> + Send + Sync>;
/// Post-processes the items a pattern returned
pub type TransformFn = Arc<dyn Fn(Vec<Item>) -> Vec<Item> + Send + Sync>;

/// Named parameters passed to [`PatternRegistry::resolve`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(BTreeMap<String, KeyValue>);

impl Params {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        let _ = self.0.insert(name.into(), value.into());
        self
    }

    /// Required parameter
    pub fn get(&self, name: &str) -> Result<&KeyValue, Error> {
        self.0
            .get(name)
            .ok_or_else(|| Error::validation(format!("missing parameter `{name}`")))
    }

    /// Optional parameter
    pub fn get_opt(&self, name: &str) -> Option<&KeyValue> {
        self.0.get(name)
    }

    /// Required string parameter
    pub fn str(&self, name: &str) -> Result<&str, Error> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| Error::validation(format!("parameter `{name}` must be a string")))
    }
}

/// A named, parameterised query definition
#[derive(Clone)]
pub struct AccessPattern {
    key_condition: KeyConditionFn,
    index_name: Option<String>,
    filter: Option<FilterFn>,
    transform: Option<TransformFn>,
    index_shape: Option<IndexShape>,
}

impl fmt::Debug for AccessPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPattern")
            .field("index_name", &self.index_name)
            .field("has_filter", &self.filter.is_some())
            .field("has_transform", &self.transform.is_some())
            .field("index_shape", &self.index_shape)
            .finish()
    }
}

impl AccessPattern {
    /// Pattern over the base table
    pub fn new<F>(key_condition: F) -> Self
    where
        F: Fn(&Params) -> Result<KeyCondition, Error> + Send + Sync + 'static,
    {
        Self {
            key_condition: Arc::new(key_condition),
            index_name: None,
            filter: None,
            transform: None,
            index_shape: None,
        }
    }

    /// Query a secondary index instead of the base table
    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Declare the key shape of the target index
    pub fn with_shape(mut self, shape: IndexShape) -> Self {
        self.index_shape = Some(shape);
        self
    }

    /// Attach a filter builder
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Params) -> Result<Option<Condition>, Error> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Attach a result transform
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<Item>) -> Vec<Item> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Target index, `None` for the base table
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }
}

/// Fully resolved pattern, ready to be turned into a query
#[derive(Clone)]
pub struct ResolvedPattern {
    /// Pattern name
    pub name: String,
    /// Target index
    pub index_name: Option<String>,
    /// Key attributes the condition was validated against
    pub shape: IndexShape,
    /// Key condition built from the call parameters
    pub key_condition: KeyCondition,
    /// Filter built from the call parameters
    pub filter: Option<Condition>,
    transform: Option<TransformFn>,
}

impl fmt::Debug for ResolvedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPattern")
            .field("name", &self.name)
            .field("index_name", &self.index_name)
            .field("shape", &self.shape)
            .field("key_condition", &self.key_condition)
            .field("filter", &self.filter)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl ResolvedPattern {
    /// Apply the pattern transform, if any
    pub fn transform(&self, items: Vec<Item>) -> Vec<Item> {
        match &self.transform {
            Some(transform) => transform(items),
            None => items,
        }
    }
}

/// Name to definition lookup plus key shape validation
///
/// Pure: nothing here talks to the store.
#[derive(Clone, Debug)]
pub struct PatternRegistry {
    primary_key: IndexShape,
    patterns: HashMap<String, AccessPattern>,
    index_shapes: BTreeMap<String, IndexShape>,
}

impl PatternRegistry {
    /// Registry for a table with the given primary key layout
    pub fn new(primary_key: IndexShape) -> Self {
        Self {
            primary_key,
            patterns: HashMap::new(),
            index_shapes: BTreeMap::new(),
        }
    }

    /// Primary key layout of the base table
    pub fn primary_key(&self) -> &IndexShape {
        &self.primary_key
    }

    /// Declare the key shape of a secondary index
    ///
    /// Registering the same shape twice is a no-op, a different one fails.
    pub fn register_index(
        &mut self,
        index_name: impl Into<String>,
        shape: IndexShape,
    ) -> Result<(), Error> {
        let index_name = index_name.into();
        shape.validate()?;
        match self.index_shapes.get(&index_name) {
            Some(existing) if *existing != shape => Err(Error::validation(format!(
                "index `{index_name}` is already registered with a different shape"
            ))),
            Some(_) => Ok(()),
            None => {
                let _ = self.index_shapes.insert(index_name, shape);
                Ok(())
            }
        }
    }

    /// Register a named pattern
    pub fn register(&mut self, name: impl Into<String>, pattern: AccessPattern) -> Result<(), Error> {
        let name = name.into();
        if name == AD_HOC_QUERY {
            return Err(Error::validation(format!("pattern name `{name}` is reserved")));
        }
        if self.patterns.contains_key(&name) {
            return Err(Error::DuplicatePattern(name));
        }

        if let Some(shape) = &pattern.index_shape {
            match &pattern.index_name {
                Some(index_name) => self.register_index(index_name.clone(), shape.clone())?,
                None => {
                    shape.validate()?;
                    if *shape != self.primary_key {
                        return Err(Error::validation(format!(
                            "pattern `{name}` declares a shape that differs from the table primary key"
                        )));
                    }
                }
            }
        }

        tracing::debug!(pattern = %name, index = ?pattern.index_name, "registered access pattern");
        let _ = self.patterns.insert(name, pattern);
        Ok(())
    }

    /// Whether a pattern with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    /// Registered pattern names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.patterns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Every index with a declared shape, sorted
    pub fn index_names(&self) -> Vec<String> {
        self.index_shapes.keys().cloned().collect()
    }

    /// Key layout for the base table (`None`) or a registered index
    pub fn shape_for(&self, index_name: Option<&str>) -> Result<&IndexShape, Error> {
        match index_name {
            None => Ok(&self.primary_key),
            Some(index_name) => self.index_shapes.get(index_name).ok_or_else(|| {
                Error::validation(format!("no key shape registered for index `{index_name}`"))
            }),
        }
    }

    /// Run the builders of a pattern and validate the resulting key condition
    pub fn resolve(&self, name: &str, params: &Params) -> Result<ResolvedPattern, Error> {
        let pattern = self
            .patterns
            .get(name)
            .ok_or_else(|| Error::PatternNotFound(name.to_string()))?;

        let key_condition = (pattern.key_condition)(params)?;
        let shape = match &pattern.index_shape {
            Some(shape) => shape,
            None => self.shape_for(pattern.index_name.as_deref())?,
        };
        check_key_condition(name, pattern.index_name.as_deref(), shape, &key_condition)?;

        let filter = match &pattern.filter {
            Some(filter) => filter(params)?,
            None => None,
        };
        if let Some(filter) = &filter {
            filter.validate()?;
        }

        Ok(ResolvedPattern {
            name: name.to_string(),
            index_name: pattern.index_name.clone(),
            shape: shape.clone(),
            key_condition,
            filter,
            transform: pattern.transform.clone(),
        })
    }
}

/// Pattern name reported by shape mismatches of queries built outside the registry
pub const AD_HOC_QUERY: &str = "<ad-hoc query>";

/// Check a key condition against a key layout
///
/// Partition keys must match exactly; sort keys may be an ordered prefix.
pub(crate) fn check_key_condition(
    pattern: &str,
    index_name: Option<&str>,
    shape: &IndexShape,
    condition: &KeyCondition,
) -> Result<(), Error> {
    let mismatch = |role: KeyRole, m: ShapeMismatch| Error::KeyShapeMismatch {
        pattern: pattern.to_string(),
        index: index_name.map(str::to_owned),
        role,
        expected: m.expected,
        actual: m.actual,
    };

    shape
        .check_partition(&condition.partition)
        .map_err(|m| mismatch(KeyRole::Partition, m))?;

    let Some(sort) = &condition.sort else {
        return Ok(());
    };

    for key in sort.keys() {
        shape
            .check_sort_prefix(key)
            .map_err(|m| mismatch(KeyRole::Sort, m))?;
    }

    match sort {
        SortCondition::Between(low, high) => {
            if low.len() != high.len() {
                return Err(mismatch(
                    KeyRole::Sort,
                    ShapeMismatch {
                        expected: low.shape(),
                        actual: high.shape(),
                    },
                ));
            }
            let prefix = low.len() - 1;
            if low.values()[..prefix] != high.values()[..prefix] {
                return Err(Error::validation(format!(
                    "pattern `{pattern}`: between bounds must share their leading sort key elements"
                )));
            }
        }
        SortCondition::BeginsWith(key) => {
            let last = last_type(key);
            if last == Some(KeyType::Number) {
                return Err(Error::validation(format!(
                    "pattern `{pattern}`: begins_with needs a string or binary sort key element"
                )));
            }
        }
        _ => {}
    }

    Ok(())
}

fn last_type(key: &Key) -> Option<KeyType> {
    key.values().last().map(KeyValue::key_type)
}
