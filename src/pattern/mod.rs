mod condition;
mod expression;
mod registry;

pub use condition::{Comparison, Condition, Filter, KeyCondition, SortCondition, UpdateAction};
pub(crate) use expression::ExpressionBuilder;
pub use expression::ExpressionAttributes;
pub(crate) use registry::check_key_condition;
pub use registry::{
    AD_HOC_QUERY, AccessPattern, FilterFn, KeyConditionFn, Params, PatternRegistry,
    ResolvedPattern, TransformFn,
};
