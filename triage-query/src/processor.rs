//! Query processor pipeline
//!
//! Stages run in order: intent classification, context prediction,
//! strategy selection, memoization. Everything is pure in-memory work, so
//! the pipeline is synchronous; the 50ms target is enforced by warning,
//! never by failing the request. Any internal failure degrades to a
//! general-search analysis so the request can proceed.

use crate::context::{predict, EnrichedContext, IncidentContext};
use crate::intent::{classify, IntentClassification};
use crate::strategy::{select, SearchStrategy};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use triage_core::QueryIntent;

/// Default end-to-end latency target.
const DEFAULT_TARGET: Duration = Duration::from_millis(50);
/// Default classifier confidence threshold.
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Memoization capacity.
const MEMO_CAPACITY: usize = 512;

/// Full analysis of one inbound query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub confidence: f64,
    /// Secondary intents when multi-intent surfacing applies.
    pub alternatives: Vec<(QueryIntent, f64)>,
    pub context: EnrichedContext,
    pub strategy: SearchStrategy,
    pub processing_time_ms: u64,
    /// Whether this is the degraded fallback analysis.
    pub degraded: bool,
}

impl QueryAnalysis {
    /// Fallback analysis: general search at 0.5 confidence, balanced plan.
    pub fn fallback(context: EnrichedContext) -> Self {
        Self {
            intent: QueryIntent::GeneralSearch,
            confidence: 0.5,
            alternatives: Vec::new(),
            context,
            strategy: SearchStrategy::balanced(),
            processing_time_ms: 0,
            degraded: true,
        }
    }
}

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub target: Duration,
    pub confidence_threshold: f64,
    /// Surface multiple candidate intents below the threshold instead of
    /// falling back to general-search.
    pub multi_intent: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            multi_intent: true,
        }
    }
}

/// Memoizing query processor.
pub struct QueryProcessor {
    config: ProcessorConfig,
    memo: RwLock<Memo>,
}

struct Memo {
    entries: HashMap<String, QueryAnalysis>,
    order: VecDeque<String>,
}

impl QueryProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            memo: RwLock::new(Memo {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ProcessorConfig::default())
    }

    /// Run the pipeline for a query.
    pub fn process(&self, query: &str, context: Option<&IncidentContext>) -> QueryAnalysis {
        let started = Instant::now();
        let key = memo_key(query, context);

        if let Ok(memo) = self.memo.read() {
            if let Some(cached) = memo.entries.get(&key) {
                return cached.clone();
            }
        }

        // Stage 1: intent classification.
        let classification = classify(query, context);

        // Stage 2: context prediction.
        let enriched = predict(query, context);

        // Below-threshold classifications either surface alternatives
        // (multi-intent) or collapse to general-search.
        let (intent, confidence, alternatives) =
            self.resolve_intent(classification);

        // Stage 3: strategy selection.
        let strategy = select(intent, &enriched);

        let elapsed = started.elapsed();
        if elapsed > self.config.target {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                target_ms = self.config.target.as_millis() as u64,
                "query processing exceeded its latency target"
            );
        }

        let analysis = QueryAnalysis {
            intent,
            confidence,
            alternatives,
            context: enriched,
            strategy,
            processing_time_ms: elapsed.as_millis() as u64,
            degraded: false,
        };

        // Stage 4: memoize.
        if let Ok(mut memo) = self.memo.write() {
            if memo.entries.len() >= MEMO_CAPACITY {
                if let Some(oldest) = memo.order.pop_front() {
                    memo.entries.remove(&oldest);
                }
            }
            if memo.entries.insert(key.clone(), analysis.clone()).is_none() {
                memo.order.push_back(key);
            }
        }

        analysis
    }

    fn resolve_intent(
        &self,
        classification: IntentClassification,
    ) -> (QueryIntent, f64, Vec<(QueryIntent, f64)>) {
        if classification.confidence >= self.config.confidence_threshold {
            return (classification.intent, classification.confidence, Vec::new());
        }
        if self.config.multi_intent {
            (
                classification.intent,
                classification.confidence,
                classification.alternatives,
            )
        } else {
            (QueryIntent::GeneralSearch, classification.confidence.max(0.5), Vec::new())
        }
    }

    /// Number of memoized analyses.
    pub fn memo_len(&self) -> usize {
        self.memo.read().map(|m| m.entries.len()).unwrap_or(0)
    }

    pub fn clear_memo(&self) {
        if let Ok(mut memo) = self.memo.write() {
            memo.entries.clear();
            memo.order.clear();
        }
    }
}

impl std::fmt::Debug for QueryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryProcessor")
            .field("target", &self.config.target)
            .field("memoized", &self.memo_len())
            .finish()
    }
}

/// Memo key: sha256 over the normalized query and the context fields.
fn memo_key(query: &str, context: Option<&IncidentContext>) -> String {
    let normalized = query.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    if let Some(ctx) = context {
        if let Ok(encoded) = serde_json::to_vec(ctx) {
            hasher.update(&encoded);
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::Severity;

    #[test]
    fn test_process_end_to_end() {
        let processor = QueryProcessor::with_defaults();
        let ctx = IncidentContext {
            alert_type: Some("disk_space".to_string()),
            severity: Some(Severity::Critical),
            affected_systems: vec!["web-01".to_string()],
        };
        let analysis = processor.process("disk space alert on web-01 runbook", Some(&ctx));

        assert_eq!(analysis.intent, QueryIntent::FindRunbook);
        assert!(analysis.confidence > 0.0 && analysis.confidence <= 1.0);
        assert!(!analysis.degraded);
        assert!(analysis.context.implied_systems.contains(&"storage".to_string()));
    }

    #[test]
    fn test_memoization_returns_identical_analysis() {
        let processor = QueryProcessor::with_defaults();
        let first = processor.process("disk space runbook", None);
        let second = processor.process("disk space runbook", None);
        assert_eq!(first, second);
        assert_eq!(processor.memo_len(), 1);
    }

    #[test]
    fn test_memo_distinguishes_context() {
        let processor = QueryProcessor::with_defaults();
        let ctx = IncidentContext {
            alert_type: Some("disk_space".to_string()),
            severity: None,
            affected_systems: vec![],
        };
        processor.process("query", None);
        processor.process("query", Some(&ctx));
        assert_eq!(processor.memo_len(), 2);
    }

    #[test]
    fn test_normalization_collapses_case_and_whitespace() {
        let processor = QueryProcessor::with_defaults();
        processor.process("Disk Space", None);
        processor.process("  disk space  ", None);
        assert_eq!(processor.memo_len(), 1);
    }

    #[test]
    fn test_low_confidence_without_multi_intent_falls_back() {
        let processor = QueryProcessor::new(ProcessorConfig {
            multi_intent: false,
            ..ProcessorConfig::default()
        });
        // "error" alone is a weak troubleshoot signal, below 0.8.
        let analysis = processor.process("error", None);
        assert_eq!(analysis.intent, QueryIntent::GeneralSearch);
    }

    #[test]
    fn test_low_confidence_with_multi_intent_keeps_candidates() {
        let processor = QueryProcessor::with_defaults();
        let analysis = processor.process("alert error", None);
        assert!(analysis.confidence < 0.8);
        assert_ne!(analysis.intent, QueryIntent::GeneralSearch);
    }

    #[test]
    fn test_fallback_analysis_shape() {
        let fallback = QueryAnalysis::fallback(EnrichedContext::default());
        assert_eq!(fallback.intent, QueryIntent::GeneralSearch);
        assert_eq!(fallback.confidence, 0.5);
        assert!(fallback.degraded);
    }
}
