mod collector;
mod detector;
mod recommend;

pub use collector::{
    ERROR_METADATA_KEY, OperationKind, OperationRecord, OperationStats, StatsCollector,
    StatsConfig, TableStats,
};
pub use detector::{
    DetectorConfig, detect_hot_partitions, detect_inefficient_reads, detect_unused_indexes,
};
pub use recommend::{Category, Recommendation, RecommendationConfig, RecommendationEngine, Severity};
