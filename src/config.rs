//! Serde-loadable table configuration.
//!
//! Every field has a default, so a partial JSON or TOML document is enough:
//!
//! ```
//! let config: dynamo_access::TableConfig = serde_json::from_str(
//!     r#"{ "bulk": { "max_attempts": 5 }, "stats": { "sample_rate": 0.1 } }"#,
//! ).unwrap();
//! assert_eq!(config.bulk.max_attempts, 5);
//! assert_eq!(config.bulk.write_chunk_size, 25);
//! ```

use serde::{Deserialize, Serialize};

use crate::bulk::BulkConfig;
use crate::stats::{RecommendationConfig, StatsConfig};

/// Configuration of one [`Table`](crate::Table)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Chunking and retry of batch and transaction calls
    pub bulk: BulkConfig,
    /// Operation sampling
    pub stats: StatsConfig,
    /// Recommendation and anti-pattern thresholds
    pub recommendations: RecommendationConfig,
}

/// `Duration` as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
