//! Upstream provider clients
//!
//! The router talks to providers through the `ProviderClient` trait so
//! tests can substitute deterministic fakes; the real implementation
//! is a thin reqwest wrapper.

mod http;
pub mod stats;

pub use http::HttpProviderClient;
pub use stats::{ProviderStats, ProviderStatsTracker};

use crate::errors::FeedResult;
use crate::router::Provider;
use crate::types::DataRequest;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Perform one metered fetch against the provider
    async fn fetch(&self, provider: &Provider, request: &DataRequest) -> FeedResult<Value>;

    /// Perform one batched call covering several requests to the same
    /// endpoint. Must return one value per item, in order.
    async fn fetch_batch(
        &self,
        provider: &Provider,
        endpoint: &str,
        items: &[DataRequest],
    ) -> FeedResult<Vec<Value>>;
}
