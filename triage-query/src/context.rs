//! Context prediction
//!
//! Enriches a raw query + alert signature with implied severity, implied
//! systems, suggested actions, a matching incident flow, and
//! organizational signals (urgency, business hours, weekend).

use chrono::{Datelike, Local, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use triage_core::Severity;

/// Alert signature supplied by the caller alongside a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentContext {
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub affected_systems: Vec<String>,
}

/// A matched incident flow with its urgency boost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowMatch {
    pub flow_id: String,
    pub score: f64,
    pub urgency_boost: f64,
}

/// Output of context prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichedContext {
    pub base: IncidentContext,
    pub implied_severity: Option<Severity>,
    pub implied_systems: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub matched_flow: Option<FlowMatch>,
    pub urgent: bool,
    pub business_hours: bool,
    pub weekend: bool,
}

impl EnrichedContext {
    /// Effective severity: the explicit one wins over the implied one.
    pub fn effective_severity(&self) -> Option<Severity> {
        self.base.severity.or(self.implied_severity)
    }

    /// Explicit plus implied systems, explicit first, no duplicates.
    pub fn all_systems(&self) -> Vec<String> {
        let mut systems = self.base.affected_systems.clone();
        for implied in &self.implied_systems {
            if !systems.contains(implied) {
                systems.push(implied.clone());
            }
        }
        systems
    }
}

// ============================================================================
// PATTERN RULES
// ============================================================================

struct PatternRule {
    pattern: Regex,
    implied_severity: Severity,
    implied_systems: &'static [&'static str],
    suggested_actions: &'static [&'static str],
}

static PATTERN_RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    let rule = |pattern: &str,
                implied_severity: Severity,
                implied_systems: &'static [&'static str],
                suggested_actions: &'static [&'static str]| {
        PatternRule {
            // The alternatives are hand-written and known-good.
            pattern: Regex::new(pattern).unwrap_or_else(|_| Regex::new("$^").unwrap()),
            implied_severity,
            implied_systems,
            suggested_actions,
        }
    };

    vec![
        rule(
            r"disk\s*(space|full|usage)|no space left",
            Severity::High,
            &["storage"],
            &["check disk usage", "rotate or prune logs"],
        ),
        rule(
            r"\boom\b|out of memory|memory leak",
            Severity::High,
            &["memory"],
            &["inspect oom-killer output", "restart the leaking service"],
        ),
        rule(
            r"\bssl\b|\btls\b|certificat",
            Severity::Medium,
            &["load-balancer"],
            &["check certificate expiry", "renew and reload"],
        ),
        rule(
            r"rollback|bad deploy|regression",
            Severity::High,
            &["deploy-pipeline"],
            &["identify the last deploy", "roll back to previous release"],
        ),
        rule(
            r"database|db (down|error)|connection pool",
            Severity::Critical,
            &["database"],
            &["check replica health", "inspect connection pool saturation"],
        ),
        rule(
            r"\bdns\b|network|latency|packet loss",
            Severity::Medium,
            &["network"],
            &["check resolver health", "trace the affected route"],
        ),
    ]
});

// ============================================================================
// INCIDENT FLOW CATALOGUE
// ============================================================================

struct IncidentFlow {
    id: &'static str,
    alert_types: &'static [&'static str],
    severity: Severity,
    system_categories: &'static [&'static str],
    urgency_boost: f64,
}

static FLOWS: &[IncidentFlow] = &[
    IncidentFlow {
        id: "flow-disk-pressure",
        alert_types: &["disk_space", "disk_full", "inode_exhaustion"],
        severity: Severity::High,
        system_categories: &["storage", "web", "database"],
        urgency_boost: 0.2,
    },
    IncidentFlow {
        id: "flow-memory-pressure",
        alert_types: &["oom_killer", "memory_usage", "swap_thrash"],
        severity: Severity::High,
        system_categories: &["memory", "web"],
        urgency_boost: 0.2,
    },
    IncidentFlow {
        id: "flow-database-outage",
        alert_types: &["db_down", "replication_lag", "connection_pool_exhausted"],
        severity: Severity::Critical,
        system_categories: &["database"],
        urgency_boost: 0.4,
    },
    IncidentFlow {
        id: "flow-cert-expiry",
        alert_types: &["ssl_expiry", "tls_handshake_failure"],
        severity: Severity::Medium,
        system_categories: &["load-balancer", "web"],
        urgency_boost: 0.1,
    },
];

const FLOW_ALERT_WEIGHT: f64 = 0.4;
const FLOW_SEVERITY_WEIGHT: f64 = 0.3;
const FLOW_SYSTEM_WEIGHT: f64 = 0.3;
const FLOW_THRESHOLD: f64 = 0.7;

/// Substrings marking a system as business-critical.
const CRITICAL_SYSTEM_MARKERS: &[&str] = &["prod", "db", "database", "payment", "auth"];

// ============================================================================
// PREDICTION
// ============================================================================

/// Run context prediction for a query + optional alert signature.
pub fn predict(query: &str, context: Option<&IncidentContext>) -> EnrichedContext {
    let base = context.cloned().unwrap_or_default();
    predict_at(query, base, Local::now().hour(), Local::now().weekday())
}

/// Deterministic core, parameterized on the wall clock for testing.
fn predict_at(
    query: &str,
    base: IncidentContext,
    hour: u32,
    weekday: chrono::Weekday,
) -> EnrichedContext {
    let haystack = match &base.alert_type {
        Some(alert) => format!("{} {}", query.to_lowercase(), alert.to_lowercase()),
        None => query.to_lowercase(),
    };

    let mut implied_severity: Option<Severity> = None;
    let mut implied_systems = Vec::new();
    let mut suggested_actions = Vec::new();

    for rule in PATTERN_RULES.iter() {
        if rule.pattern.is_match(&haystack) {
            implied_severity = Some(match implied_severity {
                Some(current) => current.max(rule.implied_severity),
                None => rule.implied_severity,
            });
            for system in rule.implied_systems {
                if !implied_systems.contains(&system.to_string()) {
                    implied_systems.push(system.to_string());
                }
            }
            for action in rule.suggested_actions {
                if !suggested_actions.contains(&action.to_string()) {
                    suggested_actions.push(action.to_string());
                }
            }
        }
    }

    let matched_flow = match_flow(&base, implied_severity, &implied_systems);

    let urgent = base
        .affected_systems
        .iter()
        .any(|system| {
            let lowered = system.to_lowercase();
            CRITICAL_SYSTEM_MARKERS
                .iter()
                .any(|marker| lowered.contains(marker))
        })
        || base.severity == Some(Severity::Critical);

    let weekend = matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun);
    let business_hours = !weekend && (9..17).contains(&hour);

    EnrichedContext {
        base,
        implied_severity,
        implied_systems,
        suggested_actions,
        matched_flow,
        urgent,
        business_hours,
        weekend,
    }
}

/// Score the catalogue: alert-type subset 0.4, severity 0.3, system
/// category overlap 0.3; attach the best flow at or above 0.7.
fn match_flow(
    base: &IncidentContext,
    implied_severity: Option<Severity>,
    implied_systems: &[String],
) -> Option<FlowMatch> {
    let alert = base.alert_type.as_deref()?.to_lowercase();
    let severity = base.severity.or(implied_severity);

    let mut systems: Vec<String> = base
        .affected_systems
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    systems.extend(implied_systems.iter().map(|s| s.to_lowercase()));

    let mut best: Option<FlowMatch> = None;
    for flow in FLOWS {
        let alert_score = if flow
            .alert_types
            .iter()
            .any(|candidate| *candidate == alert)
        {
            FLOW_ALERT_WEIGHT
        } else {
            0.0
        };

        let severity_score = match severity {
            Some(sev) => flow.severity.match_weight(sev) * FLOW_SEVERITY_WEIGHT,
            None => 0.0,
        };

        let system_score = if flow.system_categories.is_empty() || systems.is_empty() {
            0.0
        } else {
            let overlap = flow
                .system_categories
                .iter()
                .filter(|category| {
                    systems
                        .iter()
                        .any(|s| s.contains(*category) || category.contains(s.as_str()))
                })
                .count();
            (overlap as f64 / flow.system_categories.len() as f64) * FLOW_SYSTEM_WEIGHT
        };

        let score = alert_score + severity_score + system_score;
        if score >= FLOW_THRESHOLD {
            let better = best.as_ref().map(|current| score > current.score).unwrap_or(true);
            if better {
                best = Some(FlowMatch {
                    flow_id: flow.id.to_string(),
                    score,
                    urgency_boost: flow.urgency_boost,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_disk_pattern_enriches() {
        let enriched = predict_at(
            "web-01 is out of disk space",
            IncidentContext::default(),
            10,
            Weekday::Tue,
        );
        assert_eq!(enriched.implied_severity, Some(Severity::High));
        assert!(enriched.implied_systems.contains(&"storage".to_string()));
        assert!(!enriched.suggested_actions.is_empty());
    }

    #[test]
    fn test_strongest_implied_severity_wins() {
        let enriched = predict_at(
            "database connection pool exhausted and disk space low",
            IncidentContext::default(),
            10,
            Weekday::Tue,
        );
        assert_eq!(enriched.implied_severity, Some(Severity::Critical));
    }

    #[test]
    fn test_flow_match_requires_threshold() {
        let ctx = IncidentContext {
            alert_type: Some("db_down".to_string()),
            severity: Some(Severity::Critical),
            affected_systems: vec!["database-primary".to_string()],
        };
        let enriched = predict_at("db down", ctx, 10, Weekday::Tue);
        let flow = enriched.matched_flow.expect("flow should match");
        assert_eq!(flow.flow_id, "flow-database-outage");
        assert!(flow.score >= FLOW_THRESHOLD);

        // Unknown alert type: no flow.
        let ctx = IncidentContext {
            alert_type: Some("unheard_of_alert".to_string()),
            severity: None,
            affected_systems: vec![],
        };
        let enriched = predict_at("something odd", ctx, 10, Weekday::Tue);
        assert!(enriched.matched_flow.is_none());
    }

    #[test]
    fn test_urgent_on_critical_system() {
        let ctx = IncidentContext {
            alert_type: None,
            severity: None,
            affected_systems: vec!["prod-web-01".to_string()],
        };
        let enriched = predict_at("slow responses", ctx, 10, Weekday::Tue);
        assert!(enriched.urgent);
    }

    #[test]
    fn test_business_hours_and_weekend_flags() {
        let weekday_day = predict_at("q", IncidentContext::default(), 10, Weekday::Wed);
        assert!(weekday_day.business_hours);
        assert!(!weekday_day.weekend);

        let weekday_night = predict_at("q", IncidentContext::default(), 3, Weekday::Wed);
        assert!(!weekday_night.business_hours);

        let weekend = predict_at("q", IncidentContext::default(), 10, Weekday::Sat);
        assert!(weekend.weekend);
        assert!(!weekend.business_hours);
    }

    #[test]
    fn test_effective_severity_prefers_explicit() {
        let ctx = IncidentContext {
            alert_type: None,
            severity: Some(Severity::Low),
            affected_systems: vec![],
        };
        let enriched = predict_at("disk space problem", ctx, 10, Weekday::Tue);
        assert_eq!(enriched.effective_severity(), Some(Severity::Low));
    }

    #[test]
    fn test_all_systems_merges_without_duplicates() {
        let ctx = IncidentContext {
            alert_type: None,
            severity: None,
            affected_systems: vec!["storage".to_string()],
        };
        let enriched = predict_at("disk space low", ctx, 10, Weekday::Tue);
        let systems = enriched.all_systems();
        assert_eq!(systems.iter().filter(|s| *s == "storage").count(), 1);
    }
}
