/// Cost-optimization reporting
///
/// Aggregates cache efficiency, spend, and per-data-type traffic into
/// a report with concrete tuning recommendations. Counters cover the
/// process lifetime; `period_hours` labels the window the caller is
/// interested in.
use super::TypeStats;
use crate::cache::CacheStats;
use crate::router::ProviderRouter;
use crate::types::DataType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

const HIT_RATE_TARGET: f64 = 0.50;
const SPEND_RATIO_ATTENTION: f64 = 0.80;
const PROVIDER_ERROR_ATTENTION: f64 = 0.20;

#[derive(Debug, Clone, Serialize)]
pub struct DataTypeReport {
    pub data_type: DataType,
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub fetch_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    pub name: String,
    pub requests: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub period_hours: u64,
    pub generated_at: DateTime<Utc>,
    pub hit_rate: f64,
    pub lookups: u64,
    pub total_fetch_cost: f64,
    pub cost_saved: f64,
    pub hourly_spend_ratio: f64,
    pub by_data_type: Vec<DataTypeReport>,
    pub providers: Vec<ProviderReport>,
    pub recommendations: Vec<String>,
}

pub(super) fn build(
    period_hours: u64,
    cache_stats: CacheStats,
    type_stats: &HashMap<DataType, TypeStats>,
    router: &ProviderRouter,
) -> OptimizationReport {
    let budget = router.budget().snapshot();

    let mut by_data_type: Vec<DataTypeReport> = type_stats
        .iter()
        .map(|(data_type, stats)| {
            let consults = stats.hits + stats.misses;
            DataTypeReport {
                data_type: *data_type,
                requests: stats.requests,
                hits: stats.hits,
                misses: stats.misses,
                hit_rate: if consults == 0 {
                    0.0
                } else {
                    stats.hits as f64 / consults as f64
                },
                fetch_cost: stats.fetch_cost,
            }
        })
        .collect();
    // most expensive data types first: those are the cost drivers
    by_data_type.sort_by(|a, b| {
        b.fetch_cost
            .partial_cmp(&a.fetch_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let providers: Vec<ProviderReport> = router
        .registry()
        .all()
        .iter()
        .map(|handle| {
            let provider = handle.provider();
            let stats = handle.stats.snapshot();
            ProviderReport {
                name: provider.name,
                requests: stats.requests,
                error_rate: stats.error_rate(),
                avg_latency_ms: stats.avg_latency_ms,
                total_cost: stats.total_cost,
            }
        })
        .collect();

    let total_fetch_cost: f64 = by_data_type.iter().map(|row| row.fetch_cost).sum();

    let mut recommendations = Vec::new();

    for row in &by_data_type {
        if row.requests >= 10 && row.hit_rate < HIT_RATE_TARGET {
            recommendations.push(format!(
                "Raise TTL for {} data: hit rate {:.0}% is below the {:.0}% target",
                row.data_type,
                row.hit_rate * 100.0,
                HIT_RATE_TARGET * 100.0
            ));
        }
    }

    if budget.hourly_ratio() >= SPEND_RATIO_ATTENTION {
        recommendations.push(format!(
            "Hourly spend at {:.0}% of budget; shift traffic to cheaper providers or lengthen TTLs",
            budget.hourly_ratio() * 100.0
        ));
    }

    for provider in &providers {
        if provider.requests >= 5 && provider.error_rate > PROVIDER_ERROR_ATTENTION {
            recommendations.push(format!(
                "Provider {} failed {:.0}% of recent requests; lower its priority or disable it",
                provider.name,
                provider.error_rate * 100.0
            ));
        }
    }

    if cache_stats.lookups() > 50 && cache_stats.cost_saved_total < total_fetch_cost {
        recommendations.push(format!(
            "Cache savings (${:.2}) trail origin spend (${:.2}); consider pre-warming hot keys",
            cache_stats.cost_saved_total, total_fetch_cost
        ));
    }

    OptimizationReport {
        period_hours,
        generated_at: Utc::now(),
        hit_rate: cache_stats.hit_rate(),
        lookups: cache_stats.lookups(),
        total_fetch_cost,
        cost_saved: cache_stats.cost_saved_total,
        hourly_spend_ratio: budget.hourly_ratio(),
        by_data_type,
        providers,
        recommendations,
    }
}
