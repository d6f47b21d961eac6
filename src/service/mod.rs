//! Integration façade: cache-first reads with routed origin fetches
//!
//! `get_data` resolves against the tiered cache, coalesces concurrent
//! misses per key, and delegates to the router otherwise. Failures on
//! the fetch path come back as None ("temporarily unavailable", never
//! "does not exist") with a DataError event carrying the reason.

mod report;
mod singleflight;

pub use report::{DataTypeReport, OptimizationReport};
pub use singleflight::{FlightRole, SingleFlight};

use crate::cache::TieredCache;
use crate::errors::FeedError;
use crate::events::{self, FeedEvent};
use crate::logger::{self, LogTag};
use crate::router::ProviderRouter;
use crate::types::{DataRequest, DataType};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-data-type accounting for the optimization report
#[derive(Debug, Clone, Default)]
pub struct TypeStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub failures: u64,
    pub fetch_cost: f64,
}

pub struct DataService {
    cache: Arc<TieredCache>,
    router: Arc<ProviderRouter>,
    flights: Arc<SingleFlight>,
    type_stats: Arc<RwLock<HashMap<DataType, TypeStats>>>,
}

impl DataService {
    pub fn new(cache: Arc<TieredCache>, router: Arc<ProviderRouter>) -> Self {
        Self {
            cache,
            router,
            flights: Arc::new(SingleFlight::new()),
            type_stats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Resolve one request: cache first, then a routed fetch.
    ///
    /// None means the data is temporarily unavailable (budget, rate,
    /// provider failure, or deadline); it never means "does not exist".
    pub async fn get_data(&self, request: DataRequest) -> Option<Value> {
        if let Err(reason) = request.validate() {
            logger::warning(LogTag::Service, &format!("Rejected request: {}", reason));
            events::emit(FeedEvent::DataError {
                key: request.cache_key(),
                reason,
            });
            return None;
        }

        let key = request.cache_key();
        self.bump(request.data_type, |stats| stats.requests += 1);

        if request.cacheable && !request.force_fresh {
            if let Some(value) = self.cache.get(&key) {
                self.bump(request.data_type, |stats| stats.hits += 1);
                return Some(value);
            }
            self.bump(request.data_type, |stats| stats.misses += 1);
        }

        if !request.cacheable {
            return self.fetch_uncached(request).await;
        }

        match self.flights.join(&key) {
            FlightRole::Leader => self.lead_fetch(key, request).await,
            FlightRole::Follower(rx) => self.follow_fetch(key, request, rx).await,
        }
    }

    /// Leader path: spawn the fetch so a deadline abandon does not
    /// cancel it; the late result still lands in the cache and is
    /// broadcast to any followers.
    async fn lead_fetch(&self, key: String, request: DataRequest) -> Option<Value> {
        let cache = Arc::clone(&self.cache);
        let router = Arc::clone(&self.router);
        let flights = Arc::clone(&self.flights);
        let type_stats = Arc::clone(&self.type_stats);
        let deadline_ms = request.time_remaining_ms(Utc::now());

        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = match router.fetch(&request).await {
                Ok(outcome) => {
                    {
                        let mut stats = type_stats.write();
                        let entry = stats.entry(request.data_type).or_default();
                        entry.fetches += 1;
                        entry.fetch_cost += outcome.cost;
                    }
                    if let Err(err) = cache.set(
                        &task_key,
                        outcome.value.clone(),
                        request.data_type,
                        request.priority,
                        &request.tags,
                        outcome.cost,
                    ) {
                        // oversize or tier trouble: the caller still
                        // gets the value, it just is not cached
                        logger::warning(
                            LogTag::Service,
                            &format!("Fetched {} but not cached: {}", task_key, err),
                        );
                    }
                    Some(outcome.value)
                }
                Err(err) => {
                    type_stats
                        .write()
                        .entry(request.data_type)
                        .or_default()
                        .failures += 1;
                    log_fetch_failure(&task_key, &err);
                    events::emit(FeedEvent::DataError {
                        key: task_key.clone(),
                        reason: err.to_string(),
                    });
                    None
                }
            };

            flights.complete(&task_key, result.clone());
            result
        });

        match deadline_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms as u64), handle).await
            {
                Ok(joined) => joined.ok().flatten(),
                Err(_) => {
                    // abandoned: the spawned fetch keeps running and
                    // commits its result for future readers
                    self.bump_timeout(&key, ms as u64);
                    None
                }
            },
            None => handle.await.ok().flatten(),
        }
    }

    /// Follower path: await the in-flight leader instead of issuing a
    /// duplicate origin call.
    async fn follow_fetch(
        &self,
        key: String,
        request: DataRequest,
        mut rx: tokio::sync::broadcast::Receiver<Option<Value>>,
    ) -> Option<Value> {
        let deadline_ms = request.time_remaining_ms(Utc::now());

        let received = match deadline_ms {
            Some(ms) => {
                match tokio::time::timeout(Duration::from_millis(ms as u64), rx.recv()).await {
                    Ok(result) => result,
                    Err(_) => {
                        self.bump_timeout(&key, ms as u64);
                        return None;
                    }
                }
            }
            None => rx.recv().await,
        };

        match received {
            Ok(result) => result,
            Err(_) => {
                // leader vanished without completing; treat as a miss
                logger::warning(
                    LogTag::Service,
                    &format!("In-flight fetch for {} ended without a result", key),
                );
                None
            }
        }
    }

    async fn fetch_uncached(&self, request: DataRequest) -> Option<Value> {
        let key = request.cache_key();
        match self.router.fetch(&request).await {
            Ok(outcome) => {
                self.bump(request.data_type, |stats| {
                    stats.fetches += 1;
                    stats.fetch_cost += outcome.cost;
                });
                Some(outcome.value)
            }
            Err(err) => {
                self.bump(request.data_type, |stats| stats.failures += 1);
                log_fetch_failure(&key, &err);
                events::emit(FeedEvent::DataError {
                    key,
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    /// Resolve many requests, batching what can be batched.
    /// Returns (cache key, result) pairs in input order.
    pub async fn get_batch(&self, requests: Vec<DataRequest>) -> Vec<(String, Option<Value>)> {
        let mut results: Vec<(String, Option<Value>)> = requests
            .iter()
            .map(|request| (request.cache_key(), None))
            .collect();

        let mut to_fetch: Vec<usize> = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            self.bump(request.data_type, |stats| stats.requests += 1);

            if request.cacheable && !request.force_fresh {
                if let Some(value) = self.cache.get(&results[i].0) {
                    self.bump(request.data_type, |stats| stats.hits += 1);
                    results[i].1 = Some(value);
                    continue;
                }
                self.bump(request.data_type, |stats| stats.misses += 1);
            }
            to_fetch.push(i);
        }

        if to_fetch.is_empty() {
            return results;
        }

        let pending: Vec<DataRequest> = to_fetch.iter().map(|&i| requests[i].clone()).collect();
        let outcomes = self.router.execute_batch(&pending).await;

        for (&i, outcome) in to_fetch.iter().zip(outcomes) {
            let request = &requests[i];
            let key = results[i].0.clone();

            match outcome {
                Ok(outcome) => {
                    self.bump(request.data_type, |stats| {
                        stats.fetches += 1;
                        stats.fetch_cost += outcome.cost;
                    });
                    if request.cacheable {
                        if let Err(err) = self.cache.set(
                            &key,
                            outcome.value.clone(),
                            request.data_type,
                            request.priority,
                            &request.tags,
                            outcome.cost,
                        ) {
                            logger::warning(
                                LogTag::Service,
                                &format!("Fetched {} but not cached: {}", key, err),
                            );
                        }
                    }
                    results[i].1 = Some(outcome.value);
                }
                Err(err) => {
                    self.bump(request.data_type, |stats| stats.failures += 1);
                    log_fetch_failure(&key, &err);
                    events::emit(FeedEvent::DataError {
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        results
    }

    /// Pre-fetch a known-hot key set ahead of expected demand. Warming
    /// runs through the normal path, so budget and rate gates apply
    /// unchanged. Returns how many keys resolved to a value.
    pub async fn warm_cache(&self, requests: Vec<DataRequest>) -> usize {
        let total = requests.len();
        let mut warmed = 0;

        for request in requests {
            if self.get_data(request).await.is_some() {
                warmed += 1;
            }
        }

        logger::info(
            LogTag::Service,
            &format!("Cache warm pass: {}/{} keys resolved", warmed, total),
        );
        warmed
    }

    /// Aggregate traffic, cost, and per-data-type figures into a
    /// report with tuning recommendations.
    pub fn optimization_report(&self, period_hours: u64) -> OptimizationReport {
        let report = report::build(
            period_hours,
            self.cache.stats(),
            &self.type_stats.read(),
            &self.router,
        );
        events::emit(FeedEvent::ConfigurationOptimized {
            recommendations: report.recommendations.len(),
        });
        report
    }

    pub fn type_stats(&self) -> HashMap<DataType, TypeStats> {
        self.type_stats.read().clone()
    }

    fn bump<F: FnOnce(&mut TypeStats)>(&self, data_type: DataType, update: F) {
        update(self.type_stats.write().entry(data_type).or_default());
    }

    fn bump_timeout(&self, key: &str, waited_ms: u64) {
        let err = FeedError::Timeout { waited_ms };
        logger::warning(
            LogTag::Service,
            &format!("Abandoned wait for {}: {}", key, err),
        );
        events::emit(FeedEvent::DataError {
            key: key.to_string(),
            reason: err.to_string(),
        });
    }
}

fn log_fetch_failure(key: &str, err: &FeedError) {
    match err {
        FeedError::BudgetExceeded { .. } => {
            logger::warning(LogTag::Service, &format!("Fetch refused for {}: {}", key, err));
        }
        _ => {
            logger::warning(LogTag::Service, &format!("Fetch failed for {}: {}", key, err));
        }
    }
}
