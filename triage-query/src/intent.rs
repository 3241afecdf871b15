//! Rule-based intent classification
//!
//! The intent label set is closed; the rule engine behind it is an
//! implementation detail and may be replaced without touching callers.

use crate::context::IncidentContext;
use serde::Serialize;
use triage_core::QueryIntent;

/// Result of classifying one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentClassification {
    pub intent: QueryIntent,
    pub confidence: f64,
    /// Secondary candidates, surfaced only when multi-intent is enabled
    /// and the winner fell below the confidence threshold.
    pub alternatives: Vec<(QueryIntent, f64)>,
}

struct IntentRule {
    intent: QueryIntent,
    /// Phrases worth a strong signal when present in the query.
    strong: &'static [&'static str],
    /// Phrases worth a weaker signal.
    weak: &'static [&'static str],
}

const RULES: &[IntentRule] = &[
    IntentRule {
        intent: QueryIntent::EmergencyResponse,
        strong: &["outage", "emergency", "sev1", "down hard", "production down", "data loss"],
        weak: &["critical", "urgent", "immediately", "page"],
    },
    IntentRule {
        intent: QueryIntent::EscalationPath,
        strong: &["escalate", "escalation", "on-call", "oncall", "who do i contact"],
        weak: &["contact", "notify", "owner"],
    },
    IntentRule {
        intent: QueryIntent::FindRunbook,
        strong: &["runbook", "playbook", "respond to alert", "alert fired"],
        weak: &["alert", "incident", "respond"],
    },
    IntentRule {
        intent: QueryIntent::GetProcedure,
        strong: &["procedure", "steps to", "how do i", "how to", "command for"],
        weak: &["steps", "command", "execute", "run"],
    },
    IntentRule {
        intent: QueryIntent::Troubleshoot,
        strong: &["troubleshoot", "debug", "root cause", "why is", "investigate"],
        weak: &["error", "failing", "broken", "slow", "diagnose"],
    },
];

const STRONG_WEIGHT: f64 = 0.45;
const WEAK_WEIGHT: f64 = 0.2;

/// Classify a query against the closed intent set.
///
/// A supplied incident context biases the result: an alert signature with
/// critical severity leans emergency-response, any alert signature leans
/// find-runbook.
pub fn classify(query: &str, context: Option<&IncidentContext>) -> IntentClassification {
    let lowered = query.to_lowercase();
    let mut scored: Vec<(QueryIntent, f64)> = RULES
        .iter()
        .map(|rule| {
            let mut score = 0.0;
            for phrase in rule.strong {
                if lowered.contains(phrase) {
                    score += STRONG_WEIGHT;
                }
            }
            for phrase in rule.weak {
                if lowered.contains(phrase) {
                    score += WEAK_WEIGHT;
                }
            }
            (rule.intent, score)
        })
        .collect();

    if let Some(ctx) = context {
        if ctx.alert_type.is_some() {
            bump(&mut scored, QueryIntent::FindRunbook, 0.25);
        }
        if ctx.severity == Some(triage_core::Severity::Critical) {
            bump(&mut scored, QueryIntent::EmergencyResponse, 0.2);
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (intent, raw) = scored[0];
    if raw <= 0.0 {
        return IntentClassification {
            intent: QueryIntent::GeneralSearch,
            confidence: 0.5,
            alternatives: Vec::new(),
        };
    }

    let confidence = raw.min(1.0);
    let alternatives = scored
        .iter()
        .skip(1)
        .filter(|(_, s)| *s > 0.0)
        .map(|(i, s)| (*i, s.min(1.0)))
        .collect();

    IntentClassification {
        intent,
        confidence,
        alternatives,
    }
}

fn bump(scored: &mut [(QueryIntent, f64)], intent: QueryIntent, amount: f64) {
    for entry in scored.iter_mut() {
        if entry.0 == intent {
            entry.1 += amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_phrases_win() {
        let result = classify("production down, total outage, need help immediately", None);
        assert_eq!(result.intent, QueryIntent::EmergencyResponse);
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_procedure_phrases() {
        let result = classify("how do i rotate the logs, what are the steps", None);
        assert_eq!(result.intent, QueryIntent::GetProcedure);
    }

    #[test]
    fn test_unknown_query_falls_back_to_general_search() {
        let result = classify("lorem ipsum dolor", None);
        assert_eq!(result.intent, QueryIntent::GeneralSearch);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_context_biases_toward_runbooks() {
        let ctx = IncidentContext {
            alert_type: Some("disk_space".to_string()),
            severity: None,
            affected_systems: vec![],
        };
        let without = classify("disk_space alert", None);
        let with = classify("disk_space alert", Some(&ctx));
        assert!(with.confidence >= without.confidence);
        assert_eq!(with.intent, QueryIntent::FindRunbook);
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let result = classify(
            "outage emergency sev1 production down data loss critical urgent immediately page",
            None,
        );
        assert!(result.confidence <= 1.0);
    }

    #[test]
    fn test_alternatives_carry_runners_up() {
        let result = classify("troubleshoot the alert error", None);
        assert!(!result.alternatives.is_empty());
    }
}
