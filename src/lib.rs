//! # DynamoDB access layer
//!
//! A client-side layer over DynamoDB that keeps application code in terms of
//! named access patterns and typed keys:
//! - Composite string keys with lossless escaping, and native
//!   multi-attribute tuple keys validated against declared index shapes
//! - A registry of named, parameterised access patterns
//! - Batch reads and writes chunked to the store limits, with retries of
//!   unprocessed items (exponential backoff with jitter)
//! - Transactions with idempotency token passthrough
//! - Sampled operation statistics, anti-pattern detection and ranked
//!   recommendations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_access::key::{IndexShape, Key, KeyAttribute};
//! use dynamo_access::pattern::{AccessPattern, KeyCondition, Params};
//! use dynamo_access::{Error, Table, TableSchema};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let schema = TableSchema::new(
//!         "orders",
//!         IndexShape::new([KeyAttribute::string("pk")]).with_sort_key([KeyAttribute::string("sk")]),
//!     );
//!
//!     let table = Table::connect(schema)
//!         .await
//!         .pattern(
//!             "getUserOrders",
//!             AccessPattern::new(|params| {
//!                 Ok(KeyCondition::partition(Key::tuple([
//!                     params.get("tenantId")?.clone(),
//!                     params.get("userId")?.clone(),
//!                 ])))
//!             })
//!             .on_index("byTenantUser")
//!             .with_shape(
//!                 IndexShape::new([KeyAttribute::string("tenantId"), KeyAttribute::string("userId")])
//!                     .with_sort_key([KeyAttribute::number("createdAt")]),
//!             ),
//!         )
//!         .sample_rate(0.1)
//!         .build()?;
//!
//!     let params = Params::new().with("tenantId", "T1").with("userId", "U1");
//!     let orders = table.execute_pattern("getUserOrders", &params).await?;
//!     println!("{} orders", orders.len());
//!
//!     for recommendation in table.recommendations() {
//!         println!("[{}] {}", recommendation.severity, recommendation.message);
//!     }
//!     Ok(())
//! }
//! ```
#![deny(
    warnings,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

mod error;
pub use error::{CancellationReason, Error, KeyRole};

mod config;
pub use config::TableConfig;

/// Composite and multi-attribute keys
pub mod key;

/// Access patterns, conditions and expression compilation
pub mod pattern;

/// The store client seam and its request/response types
pub mod store;

/// Chunked batch calls and transactions with retry
pub mod bulk;

/// Operation log, anti-pattern detection and recommendations
pub mod stats;

mod table;
pub use table::{PageOptions, Query, Scan, Table, TableBuilder, TableSchema, TransactWrite};

// Re-export aws-config types for configuration
pub use aws_config::{
    BehaviorVersion, Region, SdkConfig, defaults,
    meta::region::{ProvideRegion, RegionProviderChain},
    retry::{RetryConfig, RetryMode},
    timeout::TimeoutConfig,
};

// Re-export aws-types for advanced configuration
pub use aws_types::sdk_config::Builder as SdkConfigBuilder;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use tokio::sync::OnceCell;

/// Global DynamoDB client instance
static GLOBAL_CLIENT: OnceCell<DynamoDbClient> = OnceCell::const_new();

/// Default SDK configuration of the global client
///
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
///
/// Batch retries of unprocessed items happen on top of this, in
/// [`bulk::BulkExecutor`].
async fn aws_config_defaults() -> SdkConfig {
    use std::time::Duration;

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    // Support LocalStack via AWS_PROFILE=localstack
    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        tracing::debug!("using LocalStack endpoint");
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// Initialize the global DynamoDB client with a custom AWS config
///
/// Has no effect once the global client exists.
///
/// # Example
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() {
///     let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
///         .region(aws_config::Region::new("us-west-2"))
///         .load()
///         .await;
///     dynamo_access::init(&config).await;
/// }
/// ```
pub async fn init(config: &SdkConfig) {
    let _ = GLOBAL_CLIENT
        .get_or_init(|| async { DynamoDbClient::new(config) })
        .await;
}

/// Initialize the global DynamoDB client with a custom client instance
pub async fn init_with_client(client: DynamoDbClient) {
    let _ = GLOBAL_CLIENT.get_or_init(|| async { client }).await;
}

/// Get a reference to the global DynamoDB client
///
/// Initializes the client with default settings on first use unless [`init`]
/// or [`init_with_client`] ran before. Used by [`Table::connect`].
pub async fn dynamodb_client() -> &'static DynamoDbClient {
    GLOBAL_CLIENT
        .get_or_init(|| async {
            let config = aws_config_defaults().await;
            DynamoDbClient::new(&config)
        })
        .await
}
