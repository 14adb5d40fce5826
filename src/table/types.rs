use crate::key::{IndexShape, ItemKey};
use crate::pattern::{Condition, KeyCondition, UpdateAction};
use crate::store::Item;

/// Name and primary key layout of a table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name
    pub table_name: String,
    /// Primary key layout
    pub primary_key: IndexShape,
}

impl TableSchema {
    /// Schema for `table_name` keyed by `primary_key`
    pub fn new(table_name: impl Into<String>, primary_key: IndexShape) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key,
        }
    }
}

/// Paging and read options of a query or scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageOptions {
    /// Maximum number of items evaluated per page
    pub limit: Option<i32>,
    /// Cursor returned as `last_evaluated_key` by the previous page
    pub exclusive_start_key: Option<Item>,
    /// Descending sort key order (queries only)
    pub descending: bool,
    /// Strongly consistent read
    pub consistent_read: bool,
}

impl PageOptions {
    /// Limit the page size
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after a previous page
    pub fn start_after(mut self, last_evaluated_key: Item) -> Self {
        self.exclusive_start_key = Some(last_evaluated_key);
        self
    }

    /// Newest sort keys first
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Strongly consistent read
    pub fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }
}

/// Ad-hoc query against the table or one of its indexes
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Secondary index, `None` for the base table
    pub index_name: Option<String>,
    /// Key condition
    pub key_condition: KeyCondition,
    /// Filter applied after the key condition
    pub filter: Option<Condition>,
    /// Paging
    pub page: PageOptions,
}

impl Query {
    /// Query over the base table
    pub fn new(key_condition: KeyCondition) -> Self {
        Self {
            index_name: None,
            key_condition,
            filter: None,
            page: PageOptions::default(),
        }
    }

    /// Target a secondary index
    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Attach a filter
    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set paging options
    pub fn with_page(mut self, page: PageOptions) -> Self {
        self.page = page;
        self
    }
}

/// Full table or index scan
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scan {
    /// Secondary index, `None` for the base table
    pub index_name: Option<String>,
    /// Filter applied to every evaluated item
    pub filter: Option<Condition>,
    /// Paging
    pub page: PageOptions,
}

impl Scan {
    /// Scan of the base table
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a secondary index
    pub fn on_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Attach a filter
    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set paging options
    pub fn with_page(mut self, page: PageOptions) -> Self {
        self.page = page;
        self
    }
}

/// One item of a write transaction against this table
#[derive(Clone, Debug, PartialEq)]
pub enum TransactWrite {
    /// Put a full item
    Put {
        /// Item, primary key attributes included
        item: Item,
        /// Optional guard
        condition: Option<Condition>,
    },
    /// Apply update actions
    Update {
        /// Primary key
        key: ItemKey,
        /// Non-empty list of actions
        actions: Vec<UpdateAction>,
        /// Optional guard
        condition: Option<Condition>,
    },
    /// Delete by primary key
    Delete {
        /// Primary key
        key: ItemKey,
        /// Optional guard
        condition: Option<Condition>,
    },
    /// Require a condition on an item without writing it
    Check {
        /// Primary key
        key: ItemKey,
        /// Condition that must hold
        condition: Condition,
    },
}

impl TransactWrite {
    /// Unconditional put
    pub fn put(item: Item) -> Self {
        TransactWrite::Put {
            item,
            condition: None,
        }
    }

    /// Unconditional update
    pub fn update(key: ItemKey, actions: Vec<UpdateAction>) -> Self {
        TransactWrite::Update {
            key,
            actions,
            condition: None,
        }
    }

    /// Unconditional delete
    pub fn delete(key: ItemKey) -> Self {
        TransactWrite::Delete {
            key,
            condition: None,
        }
    }

    /// Condition check
    pub fn check(key: ItemKey, condition: Condition) -> Self {
        TransactWrite::Check { key, condition }
    }

    /// Guard a put, update or delete; replaces the condition of a check
    pub fn when(mut self, guard: Condition) -> Self {
        match &mut self {
            TransactWrite::Put { condition, .. }
            | TransactWrite::Update { condition, .. }
            | TransactWrite::Delete { condition, .. } => *condition = Some(guard),
            TransactWrite::Check { condition, .. } => *condition = guard,
        }
        self
    }
}
