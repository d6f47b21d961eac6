/// Provider scoring
///
/// The weighted sum below is one strategy, not a law: the router only
/// depends on the `ProviderScorer` trait, so a bandit-style selector
/// can be swapped in without touching routing control flow.
use super::provider::Provider;
use crate::constants::COST_EFFICIENCY_CEILING;
use crate::types::DataRequest;

pub trait ProviderScorer: Send + Sync {
    /// Higher is better. `utilization` is the provider's current
    /// rate-limit usage, 0..=1.
    fn score(&self, provider: &Provider, request: &DataRequest, utilization: f64) -> f64;
}

/// Default scorer: 40% reliability, 40% data quality, 20% specialty,
/// 10% cost efficiency, minus a load penalty, plus a bonus for
/// headroom under the request's cost ceiling.
#[derive(Default)]
pub struct WeightedScorer;

impl WeightedScorer {
    const LOAD_PENALTY_WEIGHT: f64 = 15.0;
    const COST_HEADROOM_WEIGHT: f64 = 5.0;
}

impl ProviderScorer for WeightedScorer {
    fn score(&self, provider: &Provider, request: &DataRequest, utilization: f64) -> f64 {
        let specialized = if provider.is_specialist(request.data_type) {
            1.0
        } else {
            0.0
        };

        let cost_efficiency = ((COST_EFFICIENCY_CEILING - provider.cost_per_request)
            / COST_EFFICIENCY_CEILING)
            .max(0.0);

        let mut score = 40.0 * provider.reliability
            + 40.0 * provider.data_quality
            + 20.0 * specialized
            + 10.0 * cost_efficiency;

        score -= Self::LOAD_PENALTY_WEIGHT * utilization.clamp(0.0, 1.0);

        if let Some(max_cost) = request.max_cost {
            if max_cost > 0.0 {
                let headroom = ((max_cost - provider.cost_per_request) / max_cost).max(0.0);
                score += Self::COST_HEADROOM_WEIGHT * headroom;
            }
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::provider::tests::test_provider;
    use crate::types::DataType;

    #[test]
    fn test_specialist_outscores_generalist() {
        let specialist = test_provider("specialist", 0.01);
        let mut generalist = test_provider("generalist", 0.01);
        generalist.specialties = ["all".to_string()].into_iter().collect();

        let request = DataRequest::new("lines/nba", DataType::Odds);
        let scorer = WeightedScorer;

        assert!(
            scorer.score(&specialist, &request, 0.0) > scorer.score(&generalist, &request, 0.0)
        );
    }

    #[test]
    fn test_load_penalty_demotes_busy_provider() {
        let provider = test_provider("oddsfeed", 0.01);
        let request = DataRequest::new("lines/nba", DataType::Odds);
        let scorer = WeightedScorer;

        let idle = scorer.score(&provider, &request, 0.0);
        let busy = scorer.score(&provider, &request, 0.9);
        assert!(idle > busy);
    }

    #[test]
    fn test_cheaper_provider_wins_on_cost_terms() {
        let cheap = test_provider("cheap", 0.002);
        let pricey = test_provider("pricey", 0.05);
        let request = DataRequest::new("lines/nba", DataType::Odds).with_max_cost(0.06);
        let scorer = WeightedScorer;

        assert!(scorer.score(&cheap, &request, 0.0) > scorer.score(&pricey, &request, 0.0));
    }
}
