/// HTTP implementation of the provider client
///
/// One shared reqwest client; per-call timeouts come from the provider
/// record since upstreams differ. Batch calls POST the collected param
/// sets as a JSON array and expect an array of results back, in order.
use super::ProviderClient;
use crate::errors::{FeedError, FeedResult};
use crate::logger::{self, LogTag};
use crate::router::Provider;
use crate::types::DataRequest;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpProviderClient {
    client: Client,
}

impl HttpProviderClient {
    pub fn new() -> FeedResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn endpoint_url(&self, provider: &Provider, endpoint: &str) -> FeedResult<Url> {
        let base = Url::parse(&provider.base_url)
            .map_err(|e| FeedError::Http(format!("Bad base URL for {}: {}", provider.name, e)))?;
        base.join(endpoint)
            .map_err(|e| FeedError::Http(format!("Bad endpoint {}: {}", endpoint, e)))
    }

    async fn decode_response(
        &self,
        provider: &Provider,
        endpoint: &str,
        response: reqwest::Response,
    ) -> FeedResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Http(format!(
                "{} {} returned HTTP {}: {}",
                provider.name, endpoint, status, body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FeedError::Http(format!("{} response parse error: {}", provider.name, e)))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn fetch(&self, provider: &Provider, request: &DataRequest) -> FeedResult<Value> {
        let url = self.endpoint_url(provider, &request.endpoint)?;

        logger::debug(
            LogTag::Provider,
            &format!("GET {} via {}", request.endpoint, provider.name),
        );

        let mut builder = self
            .client
            .get(url)
            .timeout(Duration::from_secs(provider.timeout_seconds))
            .query(&request.params);

        if let Some(api_key) = &provider.api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FeedError::Http(format!("{} request failed: {}", provider.name, e)))?;

        self.decode_response(provider, &request.endpoint, response).await
    }

    async fn fetch_batch(
        &self,
        provider: &Provider,
        endpoint: &str,
        items: &[DataRequest],
    ) -> FeedResult<Vec<Value>> {
        let url = self.endpoint_url(provider, endpoint)?;
        let body: Vec<_> = items.iter().map(|item| &item.params).collect();

        logger::debug(
            LogTag::Provider,
            &format!(
                "POST {} via {} ({} items)",
                endpoint,
                provider.name,
                items.len()
            ),
        );

        let mut builder = self
            .client
            .post(url)
            .timeout(Duration::from_secs(provider.timeout_seconds))
            .json(&body);

        if let Some(api_key) = &provider.api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FeedError::Http(format!("{} batch failed: {}", provider.name, e)))?;

        let decoded = self.decode_response(provider, endpoint, response).await?;
        let Value::Array(values) = decoded else {
            return Err(FeedError::Http(format!(
                "{} batch response is not an array",
                provider.name
            )));
        };

        if values.len() != items.len() {
            return Err(FeedError::Http(format!(
                "{} batch returned {} results for {} items",
                provider.name,
                values.len(),
                items.len()
            )));
        }

        Ok(values)
    }
}
