//! Strategy selection
//!
//! Maps a classified intent plus enriched context to a search approach,
//! scoring weights, result limits, and per-stage time budgets.

use crate::context::EnrichedContext;
use serde::Serialize;
use triage_core::{QueryIntent, SearchApproach, Severity};

/// Relative weights applied when fusing result scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringWeights {
    pub semantic: f64,
    pub fuzzy: f64,
    pub metadata: f64,
    pub recency: f64,
}

impl ScoringWeights {
    pub fn balanced() -> Self {
        Self {
            semantic: 0.4,
            fuzzy: 0.3,
            metadata: 0.2,
            recency: 0.1,
        }
    }
}

/// Chosen search plan for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchStrategy {
    pub approach: SearchApproach,
    pub weights: ScoringWeights,
    pub max_results: usize,
    /// Budget for each downstream stage (adapter fan-out, fusion).
    pub stage_budget_ms: u64,
}

impl SearchStrategy {
    /// The fallback plan used when processing fails.
    pub fn balanced() -> Self {
        Self {
            approach: SearchApproach::HybridBalanced,
            weights: ScoringWeights::balanced(),
            max_results: 10,
            stage_budget_ms: 2_000,
        }
    }
}

/// Select a strategy for an intent in context.
///
/// Urgent situations trade recall for speed: fewer results, tighter
/// budgets, fuzzy-first matching. Exploratory intents go wider.
pub fn select(intent: QueryIntent, context: &EnrichedContext) -> SearchStrategy {
    let urgent = context.urgent
        || context.effective_severity() == Some(Severity::Critical)
        || context
            .matched_flow
            .as_ref()
            .map(|flow| flow.urgency_boost >= 0.3)
            .unwrap_or(false);

    let mut strategy = match intent {
        QueryIntent::EmergencyResponse => SearchStrategy {
            approach: SearchApproach::FuzzyHeavy,
            weights: ScoringWeights {
                semantic: 0.2,
                fuzzy: 0.5,
                metadata: 0.2,
                recency: 0.1,
            },
            max_results: 5,
            stage_budget_ms: 1_000,
        },
        QueryIntent::FindRunbook => SearchStrategy {
            approach: SearchApproach::HybridBalanced,
            weights: ScoringWeights {
                semantic: 0.35,
                fuzzy: 0.35,
                metadata: 0.2,
                recency: 0.1,
            },
            max_results: 10,
            stage_budget_ms: 2_000,
        },
        QueryIntent::GetProcedure | QueryIntent::EscalationPath => SearchStrategy {
            approach: SearchApproach::FuzzyHeavy,
            weights: ScoringWeights {
                semantic: 0.25,
                fuzzy: 0.45,
                metadata: 0.2,
                recency: 0.1,
            },
            max_results: 5,
            stage_budget_ms: 1_500,
        },
        QueryIntent::Troubleshoot => SearchStrategy {
            approach: SearchApproach::SemanticHeavy,
            weights: ScoringWeights {
                semantic: 0.5,
                fuzzy: 0.2,
                metadata: 0.15,
                recency: 0.15,
            },
            max_results: 15,
            stage_budget_ms: 3_000,
        },
        QueryIntent::GeneralSearch => SearchStrategy {
            approach: SearchApproach::SemanticHeavy,
            weights: ScoringWeights {
                semantic: 0.45,
                fuzzy: 0.25,
                metadata: 0.15,
                recency: 0.15,
            },
            max_results: 20,
            stage_budget_ms: 3_000,
        },
    };

    if urgent {
        strategy.max_results = strategy.max_results.min(5);
        strategy.stage_budget_ms = strategy.stage_budget_ms.min(1_000);
    }

    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EnrichedContext, IncidentContext};

    fn calm_context() -> EnrichedContext {
        EnrichedContext::default()
    }

    #[test]
    fn test_emergency_is_fast_and_narrow() {
        let strategy = select(QueryIntent::EmergencyResponse, &calm_context());
        assert_eq!(strategy.approach, SearchApproach::FuzzyHeavy);
        assert!(strategy.max_results <= 5);
        assert!(strategy.stage_budget_ms <= 1_000);
    }

    #[test]
    fn test_general_search_goes_wide() {
        let strategy = select(QueryIntent::GeneralSearch, &calm_context());
        assert_eq!(strategy.approach, SearchApproach::SemanticHeavy);
        assert!(strategy.max_results >= 15);
    }

    #[test]
    fn test_urgency_tightens_any_intent() {
        let mut context = calm_context();
        context.base = IncidentContext {
            alert_type: None,
            severity: Some(Severity::Critical),
            affected_systems: vec![],
        };
        let strategy = select(QueryIntent::GeneralSearch, &context);
        assert!(strategy.max_results <= 5);
        assert!(strategy.stage_budget_ms <= 1_000);
    }

    #[test]
    fn test_weights_sum_to_one() {
        for intent in [
            QueryIntent::EmergencyResponse,
            QueryIntent::FindRunbook,
            QueryIntent::GetProcedure,
            QueryIntent::Troubleshoot,
            QueryIntent::EscalationPath,
            QueryIntent::GeneralSearch,
        ] {
            let w = select(intent, &calm_context()).weights;
            let sum = w.semantic + w.fuzzy + w.metadata + w.recency;
            assert!((sum - 1.0).abs() < 1e-9, "weights for {:?} sum to {}", intent, sum);
        }
    }
}
