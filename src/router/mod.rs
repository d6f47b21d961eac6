//! Cost-aware provider routing
//!
//! Selection filters providers on specialty, cost ceiling, rate
//! capacity, and deadline feasibility, then scores the survivors.
//! Execution walks the decision's fallback chain, gating every attempt
//! on the budget tracker and the per-provider rate limiter. A request
//! that no provider can serve within its constraints fails with a
//! routing error; it is never silently routed over budget.

mod budget;
pub(crate) mod provider;
mod rate_limit;
mod score;

pub use budget::{BudgetSnapshot, BudgetTracker};
pub use provider::{Provider, ProviderHandle, ProviderRegistry};
pub use rate_limit::{RateLimiter, RateLimits};
pub use score::{ProviderScorer, WeightedScorer};

use crate::constants::{MAX_BATCH_SIZE, RATE_WAIT_MAX_MS};
use crate::errors::{FeedError, FeedResult};
use crate::events::{self, FeedEvent};
use crate::logger::{self, LogTag};
use crate::providers::ProviderClient;
use crate::types::{DataRequest, DataType};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transient outcome of provider selection for one request
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub provider: String,
    pub estimated_cost: f64,
    pub reason: String,
    /// Ordered fallback chain, best candidate first
    pub alternatives: Vec<String>,
}

/// A completed fetch with its attribution, so callers can account the
/// spend and stamp cache entries with the origin cost
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub value: Value,
    pub provider: String,
    pub cost: f64,
    pub latency_ms: u64,
}

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    budget: Arc<BudgetTracker>,
    client: Arc<dyn ProviderClient>,
    scorer: Box<dyn ProviderScorer>,
}

impl ProviderRouter {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        budget: Arc<BudgetTracker>,
        client: Arc<dyn ProviderClient>,
    ) -> Self {
        Self::with_scorer(registry, budget, client, Box::new(WeightedScorer))
    }

    pub fn with_scorer(
        registry: Arc<ProviderRegistry>,
        budget: Arc<BudgetTracker>,
        client: Arc<dyn ProviderClient>,
        scorer: Box<dyn ProviderScorer>,
    ) -> Self {
        Self {
            registry,
            budget,
            client,
            scorer,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    /// Pick the best viable provider for a request, with the remaining
    /// viable candidates as an ordered fallback chain.
    pub fn select_provider(&self, request: &DataRequest) -> FeedResult<RouteDecision> {
        request.validate().map_err(FeedError::InvalidRequest)?;

        let remaining_ms = request.time_remaining_ms(Utc::now());
        let mut scored: Vec<(f64, Provider)> = Vec::new();

        for handle in self.registry.enabled() {
            let provider = handle.provider();

            if !provider.serves(request.data_type) {
                continue;
            }
            if let Some(max_cost) = request.max_cost {
                if provider.cost_per_request > max_cost {
                    continue;
                }
            }
            if !handle.limiter.has_capacity() {
                continue;
            }
            if let Some(remaining) = remaining_ms {
                if provider.avg_latency_ms as i64 > remaining {
                    continue;
                }
            }

            let utilization = handle.limiter.utilization();
            let score = self.scorer.score(&provider, request, utilization);
            scored.push((score, provider));
        }

        if scored.is_empty() {
            return Err(FeedError::RoutingExhausted(format!(
                "no provider serves {} within cost/rate/deadline constraints (max_cost={:?})",
                request.data_type, request.max_cost
            )));
        }

        scored.sort_by(|(score_a, prov_a), (score_b, prov_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(prov_a.fallback_priority.cmp(&prov_b.fallback_priority))
        });

        let (best_score, best) = &scored[0];
        let alternatives: Vec<String> = scored[1..]
            .iter()
            .map(|(_, provider)| provider.name.clone())
            .collect();

        let reason = format!(
            "{} scored {:.1} (reliability {:.2}, quality {:.2}, {}); {} fallback(s)",
            best.name,
            best_score,
            best.reliability,
            best.data_quality,
            if best.is_specialist(request.data_type) {
                "specialist"
            } else {
                "generalist"
            },
            alternatives.len()
        );

        logger::debug(LogTag::Router, &reason);

        Ok(RouteDecision {
            provider: best.name.clone(),
            estimated_cost: best.cost_per_request,
            reason,
            alternatives,
        })
    }

    /// Execute a routed request, falling back through the decision's
    /// alternatives on provider failure. Terminates after at most
    /// alternatives + 1 attempts. A budget refusal aborts the whole
    /// chain: the gate is global, not a property of one provider.
    pub async fn execute(
        &self,
        request: &DataRequest,
        decision: &RouteDecision,
    ) -> FeedResult<FetchOutcome> {
        let mut chain = vec![decision.provider.clone()];
        chain.extend(decision.alternatives.iter().cloned());

        let mut last_err: Option<FeedError> = None;

        for name in &chain {
            let Some(handle) = self.registry.get(name) else {
                continue;
            };
            let provider = handle.provider();
            if !provider.enabled {
                continue;
            }

            let max_wait = request
                .time_remaining_ms(Utc::now())
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(Duration::from_millis(RATE_WAIT_MAX_MS));

            if !handle.limiter.acquire_within(max_wait).await {
                logger::debug(
                    LogTag::RateLimit,
                    &format!("No capacity on {} within {:?}", name, max_wait),
                );
                last_err = Some(FeedError::RateLimited {
                    provider: name.clone(),
                });
                continue;
            }

            // the gate approves and charges atomically; a refusal is
            // surfaced as-is so callers can tell it from exhaustion
            self.budget.try_charge(provider.cost_per_request)?;

            let start = Instant::now();
            match self.client.fetch(&provider, request).await {
                Ok(value) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    handle
                        .stats
                        .record_success(latency_ms as f64, provider.cost_per_request);
                    events::emit(FeedEvent::RequestCompleted {
                        key: request.cache_key(),
                        provider: provider.name.clone(),
                        cost: provider.cost_per_request,
                        latency_ms,
                    });
                    return Ok(FetchOutcome {
                        value,
                        provider: provider.name.clone(),
                        cost: provider.cost_per_request,
                        latency_ms,
                    });
                }
                Err(err) => {
                    let latency_ms = start.elapsed().as_millis() as f64;
                    handle.stats.record_failure(latency_ms, &err.to_string());
                    logger::warning(
                        LogTag::Router,
                        &format!("{} failed, trying next fallback: {}", name, err),
                    );
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(FeedError::RateLimited { provider }) => {
                Err(FeedError::RateLimited { provider })
            }
            Some(err) => Err(FeedError::ProviderFailure {
                provider: chain.last().cloned().unwrap_or_default(),
                reason: format!("all {} provider(s) failed; last: {}", chain.len(), err),
            }),
            None => Err(FeedError::RoutingExhausted(
                "fallback chain contained no usable provider".to_string(),
            )),
        }
    }

    /// Select and execute in one step
    pub async fn fetch(&self, request: &DataRequest) -> FeedResult<FetchOutcome> {
        let decision = self.select_provider(request)?;
        self.execute(request, &decision).await
    }

    /// Execute a set of requests, grouping batchable ones that share
    /// an endpoint and data type into single provider calls where the
    /// provider supports batch semantics. A failed batch call degrades
    /// to per-item routing, not to a hard failure.
    pub async fn execute_batch(
        &self,
        requests: &[DataRequest],
    ) -> Vec<FeedResult<FetchOutcome>> {
        let mut results: Vec<Option<FeedResult<FetchOutcome>>> = Vec::with_capacity(requests.len());
        results.resize_with(requests.len(), || None);

        let mut groups: HashMap<(String, DataType), Vec<usize>> = HashMap::new();
        let mut singles: Vec<usize> = Vec::new();

        for (i, request) in requests.iter().enumerate() {
            if request.batchable {
                groups
                    .entry((request.endpoint.clone(), request.data_type))
                    .or_default()
                    .push(i);
            } else {
                singles.push(i);
            }
        }

        for ((endpoint, _data_type), mut indices) in groups {
            // batches larger than the wire limit split into chunks
            while indices.len() > MAX_BATCH_SIZE {
                let rest = indices.split_off(MAX_BATCH_SIZE);
                self.run_group(&endpoint, &indices, requests, &mut results).await;
                indices = rest;
            }
            if indices.len() == 1 {
                singles.push(indices[0]);
            } else if !indices.is_empty() {
                self.run_group(&endpoint, &indices, requests, &mut results).await;
            }
        }

        for i in singles {
            let result = self.fetch(&requests[i]).await;
            results[i] = Some(result);
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(FeedError::RoutingExhausted(
                        "request was never routed".to_string(),
                    ))
                })
            })
            .collect()
    }

    async fn run_group(
        &self,
        endpoint: &str,
        indices: &[usize],
        requests: &[DataRequest],
        results: &mut [Option<FeedResult<FetchOutcome>>],
    ) {
        let representative = &requests[indices[0]];

        let batch_outcome = match self.select_provider(representative) {
            Ok(decision) => self.try_batch_call(endpoint, indices, requests, &decision).await,
            Err(err) => {
                logger::debug(
                    LogTag::Router,
                    &format!("Batch selection failed for {}: {}", endpoint, err),
                );
                None
            }
        };

        match batch_outcome {
            Some(outcomes) => {
                for (slot, outcome) in indices.iter().zip(outcomes) {
                    results[*slot] = Some(Ok(outcome));
                }
            }
            None => {
                // degrade to per-item routing
                for &i in indices {
                    results[i] = Some(self.fetch(&requests[i]).await);
                }
            }
        }
    }

    /// One batched provider call; None means "fall back to per-item".
    /// The single call's cost is amortized across the items it served.
    async fn try_batch_call(
        &self,
        endpoint: &str,
        indices: &[usize],
        requests: &[DataRequest],
        decision: &RouteDecision,
    ) -> Option<Vec<FetchOutcome>> {
        let handle = self.registry.get(&decision.provider)?;
        let provider = handle.provider();
        if !provider.supports_batch {
            return None;
        }

        if !handle
            .limiter
            .acquire_within(Duration::from_millis(RATE_WAIT_MAX_MS))
            .await
        {
            return None;
        }
        if self.budget.try_charge(provider.cost_per_request).is_err() {
            return None;
        }

        let items: Vec<DataRequest> = indices.iter().map(|&i| requests[i].clone()).collect();

        let start = Instant::now();
        match self.client.fetch_batch(&provider, endpoint, &items).await {
            Ok(values) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                handle
                    .stats
                    .record_success(latency_ms as f64, provider.cost_per_request);
                events::emit(FeedEvent::RequestCompleted {
                    key: format!("batch:{}:{}", endpoint, items.len()),
                    provider: provider.name.clone(),
                    cost: provider.cost_per_request,
                    latency_ms,
                });
                let per_item_cost = provider.cost_per_request / items.len().max(1) as f64;
                Some(
                    values
                        .into_iter()
                        .map(|value| FetchOutcome {
                            value,
                            provider: provider.name.clone(),
                            cost: per_item_cost,
                            latency_ms,
                        })
                        .collect(),
                )
            }
            Err(err) => {
                handle
                    .stats
                    .record_failure(start.elapsed().as_millis() as f64, &err.to_string());
                logger::warning(
                    LogTag::Router,
                    &format!(
                        "Batch call to {} failed, degrading to per-item: {}",
                        provider.name, err
                    ),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::provider::tests::test_provider;
    use super::*;
    use crate::config::BudgetSettings;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashSet;

    struct MockClient {
        failing: HashSet<String>,
        fail_batch: bool,
        calls: Mutex<Vec<String>>,
        batch_calls: Mutex<u32>,
    }

    impl MockClient {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                fail_batch: false,
                calls: Mutex::new(Vec::new()),
                batch_calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ProviderClient for MockClient {
        async fn fetch(&self, provider: &Provider, request: &DataRequest) -> FeedResult<Value> {
            self.calls.lock().push(provider.name.clone());
            if self.failing.contains(&provider.name) {
                return Err(FeedError::Http(format!("{} is down", provider.name)));
            }
            Ok(json!({"provider": provider.name, "endpoint": request.endpoint}))
        }

        async fn fetch_batch(
            &self,
            provider: &Provider,
            _endpoint: &str,
            items: &[DataRequest],
        ) -> FeedResult<Vec<Value>> {
            *self.batch_calls.lock() += 1;
            if self.fail_batch || self.failing.contains(&provider.name) {
                return Err(FeedError::Http("batch endpoint is down".to_string()));
            }
            Ok(items
                .iter()
                .map(|item| json!({"provider": provider.name, "params": item.params}))
                .collect())
        }
    }

    fn budget() -> Arc<BudgetTracker> {
        Arc::new(BudgetTracker::new(BudgetSettings::default()))
    }

    fn router_with(
        providers: Vec<Provider>,
        client: Arc<MockClient>,
        budget: Arc<BudgetTracker>,
    ) -> ProviderRouter {
        let registry = Arc::new(ProviderRegistry::new());
        for provider in providers {
            registry.update_provider(provider);
        }
        ProviderRouter::new(registry, budget, client)
    }

    #[tokio::test]
    async fn test_no_provider_under_max_cost_is_routing_exhausted() {
        let client = Arc::new(MockClient::new(&[]));
        let router = router_with(
            vec![
                test_provider("a", 0.01),
                test_provider("b", 0.005),
                test_provider("c", 0.02),
            ],
            client.clone(),
            budget(),
        );

        let request = DataRequest::new("lines/nba", DataType::Odds).with_max_cost(0.001);
        let err = router.select_provider(&request).unwrap_err();
        assert!(matches!(err, FeedError::RoutingExhausted(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_selection_respects_max_cost() {
        let router = router_with(
            vec![test_provider("cheap", 0.005), test_provider("pricey", 0.02)],
            Arc::new(MockClient::new(&[])),
            budget(),
        );

        let request = DataRequest::new("lines/nba", DataType::Odds).with_max_cost(0.008);
        let decision = router.select_provider(&request).unwrap();
        assert_eq!(decision.provider, "cheap");
        assert!(decision.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_on_fallback_priority() {
        let mut first = test_provider("first", 0.01);
        first.fallback_priority = 1;
        let mut second = test_provider("second", 0.01);
        second.fallback_priority = 5;

        let router = router_with(vec![second, first], Arc::new(MockClient::new(&[])), budget());

        let request = DataRequest::new("lines/nba", DataType::Odds);
        let decision = router.select_provider(&request).unwrap();
        assert_eq!(decision.provider, "first");
        assert_eq!(decision.alternatives, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_on_provider_failure() {
        let mut primary = test_provider("primary", 0.01);
        primary.reliability = 0.99;
        primary.fallback_priority = 1;
        let backup = test_provider("backup", 0.01);

        let client = Arc::new(MockClient::new(&["primary"]));
        let router = router_with(vec![primary, backup], client.clone(), budget());

        let request = DataRequest::new("lines/nba", DataType::Odds);
        let decision = router.select_provider(&request).unwrap();
        assert_eq!(decision.provider, "primary");

        let outcome = router.execute(&request, &decision).await.unwrap();
        assert_eq!(outcome.value["provider"], "backup");
        assert_eq!(outcome.provider, "backup");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fallback_terminates_after_chain_exhaustion() {
        let providers = vec![
            test_provider("a", 0.01),
            test_provider("b", 0.01),
            test_provider("c", 0.01),
        ];
        let client = Arc::new(MockClient::new(&["a", "b", "c"]));
        let router = router_with(providers, client.clone(), budget());

        let request = DataRequest::new("lines/nba", DataType::Odds);
        let decision = router.select_provider(&request).unwrap();
        let err = router.execute(&request, &decision).await.unwrap_err();

        assert!(matches!(err, FeedError::ProviderFailure { .. }));
        // bounded: one attempt per provider in the chain, then stop
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_budget_refusal_blocks_before_any_call() {
        let settings = BudgetSettings {
            hourly_limit: 0.005,
            ..Default::default()
        };
        let client = Arc::new(MockClient::new(&[]));
        let router = router_with(
            vec![test_provider("a", 0.01)],
            client.clone(),
            Arc::new(BudgetTracker::new(settings)),
        );

        let request = DataRequest::new("lines/nba", DataType::Odds);
        let decision = router.select_provider(&request).unwrap();
        let err = router.execute(&request, &decision).await.unwrap_err();

        assert!(matches!(err, FeedError::BudgetExceeded { .. }));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_groups_into_single_call() {
        let mut provider = test_provider("batcher", 0.01);
        provider.supports_batch = true;

        let client = Arc::new(MockClient::new(&[]));
        let router = router_with(vec![provider], client.clone(), budget());

        let requests: Vec<DataRequest> = (0..3)
            .map(|i| {
                DataRequest::new("lines/nba", DataType::Odds)
                    .with_param("game", &i.to_string())
                    .batchable()
            })
            .collect();

        let results = router.execute_batch(&requests).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(*client.batch_calls.lock(), 1);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_failure_degrades_to_per_item() {
        let mut provider = test_provider("batcher", 0.01);
        provider.supports_batch = true;

        let mut client = MockClient::new(&[]);
        client.fail_batch = true;
        let client = Arc::new(client);
        let router = router_with(vec![provider], client.clone(), budget());

        let requests: Vec<DataRequest> = (0..3)
            .map(|i| {
                DataRequest::new("lines/nba", DataType::Odds)
                    .with_param("game", &i.to_string())
                    .batchable()
            })
            .collect();

        let results = router.execute_batch(&requests).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(*client.batch_calls.lock(), 1);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_provider_without_batch_support_goes_sequential() {
        let provider = test_provider("plain", 0.01);
        let client = Arc::new(MockClient::new(&[]));
        let router = router_with(vec![provider], client.clone(), budget());

        let requests: Vec<DataRequest> = (0..2)
            .map(|i| {
                DataRequest::new("lines/nba", DataType::Odds)
                    .with_param("game", &i.to_string())
                    .batchable()
            })
            .collect();

        let results = router.execute_batch(&requests).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(*client.batch_calls.lock(), 0);
        assert_eq!(client.call_count(), 2);
    }
}
