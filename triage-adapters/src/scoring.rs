//! Relevance scoring shared by adapter variants
//!
//! Pure functions: tokenization, document scoring with excerpt extraction,
//! and runbook scoring against an alert signature. Adapters call these so
//! every variant ranks the same way.

use triage_core::{Runbook, Severity};

/// Weight of alert-type trigger overlap in the runbook score.
const TRIGGER_WEIGHT: f64 = 0.5;
/// Weight of severity agreement in the runbook score.
const SEVERITY_WEIGHT: f64 = 0.3;
/// Weight of affected-system overlap in the runbook score.
const SYSTEM_WEIGHT: f64 = 0.2;

/// Lowercased alphanumeric tokens of a text.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Fraction of `query` tokens present in `target`, in [0, 1].
pub fn token_overlap(query: &[String], target: &[String]) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let hits = query.iter().filter(|t| target.contains(t)).count();
    hits as f64 / query.len() as f64
}

/// Score of one document against a free-text query, with the excerpt
/// window around the strongest match and the reasons that fired.
pub struct DocumentScore {
    pub confidence: f64,
    pub match_reasons: Vec<String>,
    pub excerpt: String,
}

/// Title matches weigh more than body matches; an exact phrase hit in the
/// body adds a bonus on top.
pub fn score_document(query: &str, title: &str, content: &str) -> DocumentScore {
    let query_tokens = tokenize(query);
    let title_tokens = tokenize(title);
    let content_tokens = tokenize(content);

    let title_overlap = token_overlap(&query_tokens, &title_tokens);
    let content_overlap = token_overlap(&query_tokens, &content_tokens);
    let phrase_bonus = if !query.trim().is_empty()
        && content.to_lowercase().contains(&query.trim().to_lowercase())
    {
        0.15
    } else {
        0.0
    };

    let confidence = (title_overlap * 0.6 + content_overlap * 0.4 + phrase_bonus).clamp(0.0, 1.0);

    let mut match_reasons = Vec::new();
    if title_overlap > 0.0 {
        match_reasons.push(format!(
            "title matches {:.0}% of query terms",
            title_overlap * 100.0
        ));
    }
    if content_overlap > 0.0 {
        match_reasons.push(format!(
            "content matches {:.0}% of query terms",
            content_overlap * 100.0
        ));
    }
    if phrase_bonus > 0.0 {
        match_reasons.push("exact phrase match".to_string());
    }

    DocumentScore {
        confidence,
        match_reasons,
        excerpt: excerpt_around(content, &query_tokens, 240),
    }
}

/// Content window around the first query-token occurrence, trimmed to
/// `max_len` characters on a char boundary.
pub fn excerpt_around(content: &str, query_tokens: &[String], max_len: usize) -> String {
    let lower = content.to_lowercase();
    let position = query_tokens
        .iter()
        .filter_map(|t| lower.find(t.as_str()))
        .min()
        .unwrap_or(0);

    let start = content
        .char_indices()
        .map(|(i, _)| i)
        .filter(|i| *i <= position.saturating_sub(40))
        .next_back()
        .unwrap_or(0);

    let window: String = content[start..].chars().take(max_len).collect();
    if start > 0 || content.len() > start + window.len() {
        format!("...{}...", window.trim())
    } else {
        window.trim().to_string()
    }
}

/// Evidence produced when scoring a runbook against an alert signature.
pub struct RunbookScore {
    pub confidence: f64,
    pub match_reasons: Vec<String>,
}

/// Weighted sum of trigger overlap, severity agreement, and system overlap.
///
/// Returns None when nothing matched at all, so adapters can skip the
/// runbook instead of surfacing a zero-confidence result.
pub fn score_runbook(
    runbook: &Runbook,
    alert_type: &str,
    severity: Severity,
    affected_systems: &[String],
) -> Option<RunbookScore> {
    let alert_tokens = tokenize(alert_type);
    let mut reasons = Vec::new();

    // (i) alert-type overlap with declared triggers, best trigger wins
    let mut trigger_score = 0.0f64;
    let mut best_trigger: Option<&str> = None;
    for trigger in &runbook.triggers {
        let overlap = if trigger.eq_ignore_ascii_case(alert_type) {
            1.0
        } else {
            token_overlap(&alert_tokens, &tokenize(trigger))
        };
        if overlap > trigger_score {
            trigger_score = overlap;
            best_trigger = Some(trigger);
        }
    }
    if let Some(trigger) = best_trigger {
        if trigger_score >= 1.0 {
            reasons.push(format!("alert type matches trigger '{}'", trigger));
        } else {
            reasons.push(format!(
                "alert type overlaps trigger '{}' ({:.0}%)",
                trigger,
                trigger_score * 100.0
            ));
        }
    }

    // (ii) severity agreement for this alert type
    let severity_score = match runbook.severity_mapping.get(alert_type) {
        Some(mapped) => {
            let weight = mapped.match_weight(severity);
            if weight >= 1.0 {
                reasons.push(format!("severity {} matches runbook severity", severity));
            } else if weight > 0.0 {
                reasons.push(format!(
                    "severity {} adjacent to runbook severity {}",
                    severity, mapped
                ));
            }
            weight
        }
        None => 0.0,
    };

    // (iii) affected-system mentions anywhere in the runbook text
    let haystack = runbook_text_tokens(runbook);
    let mut mentioned = 0usize;
    for system in affected_systems {
        let system_tokens = tokenize(system);
        if !system_tokens.is_empty() && system_tokens.iter().all(|t| haystack.contains(t)) {
            mentioned += 1;
            reasons.push(format!("system {} referenced", system));
        }
    }
    let system_score = if affected_systems.is_empty() {
        0.0
    } else {
        mentioned as f64 / affected_systems.len() as f64
    };

    let confidence = (trigger_score * TRIGGER_WEIGHT
        + severity_score * SEVERITY_WEIGHT
        + system_score * SYSTEM_WEIGHT)
        .clamp(0.0, 1.0);

    if confidence <= 0.0 {
        None
    } else {
        Some(RunbookScore {
            confidence,
            match_reasons: reasons,
        })
    }
}

fn runbook_text_tokens(runbook: &Runbook) -> Vec<String> {
    let mut tokens = tokenize(&runbook.title);
    for trigger in &runbook.triggers {
        tokens.extend(tokenize(trigger));
    }
    tokens.extend(tokenize(&runbook.decision_tree.description));
    for branch in &runbook.decision_tree.branches {
        tokens.extend(tokenize(&branch.condition));
        tokens.extend(tokenize(&branch.description));
        tokens.extend(tokenize(&branch.action));
    }
    for step in &runbook.procedures {
        tokens.extend(tokenize(&step.name));
        tokens.extend(tokenize(&step.description));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use triage_core::{DecisionTree, RunbookMetadata};

    fn runbook(triggers: Vec<&str>, mapping: Vec<(&str, Severity)>) -> Runbook {
        Runbook {
            id: "rb1".to_string(),
            title: "Disk space exhaustion on web-01".to_string(),
            version: "2".to_string(),
            triggers: triggers.into_iter().map(String::from).collect(),
            severity_mapping: mapping
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
            decision_tree: DecisionTree {
                id: "dt1".to_string(),
                name: "disk".to_string(),
                description: "handles full disks".to_string(),
                branches: vec![],
                default_action: "escalate".to_string(),
            },
            procedures: vec![],
            escalation_path: None,
            metadata: RunbookMetadata {
                author: "ops".to_string(),
                confidence: 0.9,
                success_rate: None,
                avg_resolution_minutes: None,
                success_count: 0,
            },
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(tokenize("disk_space, SSL!"), vec!["disk", "space", "ssl"]);
    }

    #[test]
    fn test_exact_trigger_and_severity() {
        let rb = runbook(vec!["disk_space"], vec![("disk_space", Severity::Critical)]);
        let score = score_runbook(&rb, "disk_space", Severity::Critical, &[]).unwrap();
        // trigger 1.0 * 0.5 + severity 1.0 * 0.3
        assert!((score.confidence - 0.8).abs() < 1e-9);
        assert!(score
            .match_reasons
            .iter()
            .any(|r| r.contains("matches trigger")));
    }

    #[test]
    fn test_adjacent_severity_half_weight() {
        let rb = runbook(vec!["disk_space"], vec![("disk_space", Severity::High)]);
        let score = score_runbook(&rb, "disk_space", Severity::Critical, &[]).unwrap();
        assert!((score.confidence - (0.5 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_system_overlap_counts() {
        let rb = runbook(vec!["disk_space"], vec![]);
        let score = score_runbook(
            &rb,
            "disk_space",
            Severity::High,
            &["web-01".to_string(), "db-09".to_string()],
        )
        .unwrap();
        // trigger 0.5 + one of two systems mentioned 0.1
        assert!((score.confidence - 0.6).abs() < 1e-9);
        assert!(score.match_reasons.iter().any(|r| r.contains("web-01")));
    }

    #[test]
    fn test_unrelated_runbook_is_skipped() {
        let rb = runbook(vec!["certificate_expiry"], vec![]);
        assert!(score_runbook(&rb, "oom_killer", Severity::High, &[]).is_none());
    }

    #[test]
    fn test_document_scoring_prefers_title() {
        let title_hit = score_document("disk space", "Disk space runbook", "unrelated body");
        let body_hit = score_document("disk space", "Unrelated title", "all about disk space");
        assert!(title_hit.confidence > body_hit.confidence);
        assert!(body_hit
            .match_reasons
            .iter()
            .any(|r| r.contains("exact phrase")));
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let score = score_document("disk disk disk", "disk disk", "disk disk disk disk");
        assert!(score.confidence <= 1.0);
        assert!(score.confidence >= 0.0);
    }

    #[test]
    fn test_excerpt_windows_content() {
        let content = format!("{}disk space filled{}", "x".repeat(300), "y".repeat(300));
        let excerpt = excerpt_around(&content, &tokenize("disk"), 100);
        assert!(excerpt.contains("disk"));
        assert!(excerpt.len() <= 110);
    }
}
