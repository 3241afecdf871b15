//! Runbook, decision tree, and procedure types

use crate::{Severity, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// PROCEDURE STEPS
// ============================================================================

/// One atomic action in a runbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProcedureStep {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub expected_outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Ids of steps that must complete before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_required: Vec<String>,
}

// ============================================================================
// DECISION TREES
// ============================================================================

/// One branch in a decision tree. `next_step` points at another branch id;
/// the pointers must form a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DecisionBranch {
    pub id: String,
    /// Free-text condition an operator evaluates.
    pub condition: String,
    pub description: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_step: Option<String>,
}

/// Named DAG of branches guiding an operator through an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DecisionTree {
    pub id: String,
    pub name: String,
    pub description: String,
    pub branches: Vec<DecisionBranch>,
    /// Action taken when no branch condition holds.
    pub default_action: String,
}

impl DecisionTree {
    /// Validate the branch graph. Cycles and dangling `next_step` pointers
    /// are rejected here, at load time, never during traversal.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ids: HashSet<&str> = self.branches.iter().map(|b| b.id.as_str()).collect();
        if ids.len() != self.branches.len() {
            return Err(ValidationError::InvalidValue {
                field: "branches".to_string(),
                reason: format!("duplicate branch id in tree {}", self.id),
            });
        }

        let next: HashMap<&str, &str> = self
            .branches
            .iter()
            .filter_map(|b| b.next_step.as_deref().map(|n| (b.id.as_str(), n)))
            .collect();

        for (from, to) in &next {
            if !ids.contains(to) {
                return Err(ValidationError::InvalidValue {
                    field: "next_step".to_string(),
                    reason: format!("branch {} points at unknown branch {}", from, to),
                });
            }
        }

        for branch in &self.branches {
            if !(0.0..=1.0).contains(&branch.confidence) {
                return Err(ValidationError::OutOfRange {
                    field: format!("branches[{}].confidence", branch.id),
                    min: "0".to_string(),
                    max: "1".to_string(),
                });
            }
        }

        // Walk next_step chains from every branch; revisiting a node on the
        // current path means a cycle.
        for start in self.branches.iter().map(|b| b.id.as_str()) {
            let mut seen = HashSet::new();
            let mut current = start;
            while let Some(&to) = next.get(current) {
                if !seen.insert(current) {
                    return Err(ValidationError::CyclicDecisionTree {
                        tree_id: self.id.clone(),
                        branch_id: current.to_string(),
                    });
                }
                current = to;
            }
        }

        Ok(())
    }

    /// Look up a branch by id.
    pub fn branch(&self, id: &str) -> Option<&DecisionBranch> {
        self.branches.iter().find(|b| b.id == id)
    }
}

// ============================================================================
// RUNBOOKS
// ============================================================================

/// Author-supplied runbook metadata plus engine-maintained rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RunbookMetadata {
    pub author: String,
    /// Author confidence that this runbook resolves its triggers, in [0, 1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_resolution_minutes: Option<f64>,
    /// Successful resolutions recorded via feedback.
    #[serde(default)]
    pub success_count: u64,
}

/// Structured operational document: triggers, a decision tree, ordered
/// procedures, and escalation info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Runbook {
    pub id: String,
    pub title: String,
    pub version: String,
    /// Alert-type strings this runbook responds to.
    pub triggers: Vec<String>,
    /// Per-alert-type severity this runbook is written for.
    #[serde(default)]
    pub severity_mapping: BTreeMap<String, Severity>,
    pub decision_tree: DecisionTree,
    pub procedures: Vec<ProcedureStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_path: Option<String>,
    pub metadata: RunbookMetadata,
    pub last_updated: DateTime<Utc>,
}

impl Runbook {
    /// Validate the runbook at load time: decision-tree DAG, confidence
    /// bounds, and procedure prerequisite references.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.decision_tree.validate()?;

        if !(0.0..=1.0).contains(&self.metadata.confidence) {
            return Err(ValidationError::OutOfRange {
                field: "metadata.confidence".to_string(),
                min: "0".to_string(),
                max: "1".to_string(),
            });
        }
        if let Some(rate) = self.metadata.success_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ValidationError::OutOfRange {
                    field: "metadata.success_rate".to_string(),
                    min: "0".to_string(),
                    max: "1".to_string(),
                });
            }
        }

        let step_ids: HashSet<&str> = self.procedures.iter().map(|s| s.id.as_str()).collect();
        for step in &self.procedures {
            for prereq in &step.prerequisites {
                if !step_ids.contains(prereq.as_str()) {
                    return Err(ValidationError::InvalidValue {
                        field: format!("procedures[{}].prerequisites", step.id),
                        reason: format!("unknown step id {}", prereq),
                    });
                }
            }
        }

        Ok(())
    }

    /// Find a procedure step by name (case-insensitive), used to resolve
    /// `<runbook-id>_<step-name>` procedure ids.
    pub fn step_by_name(&self, name: &str) -> Option<&ProcedureStep> {
        self.procedures
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name) || s.id.eq_ignore_ascii_case(name))
    }
}

/// A runbook paired with the match evidence an adapter produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RunbookMatch {
    pub runbook: Runbook,
    pub confidence: f64,
    pub match_reasons: Vec<String>,
    pub source_name: String,
}

// ============================================================================
// ESCALATION
// ============================================================================

/// A single escalation contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EscalationContact {
    pub name: String,
    pub role: String,
    /// Pager/Slack/email handle; channel-specific.
    pub contact: String,
}

/// Resolved escalation plan for a severity + business-hours combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EscalationPlan {
    pub severity: Severity,
    pub contacts: Vec<EscalationContact>,
    pub procedure: String,
    pub estimated_response_minutes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(id: &str, next: Option<&str>) -> DecisionBranch {
        DecisionBranch {
            id: id.to_string(),
            condition: "disk usage > 90%".to_string(),
            description: "check disk".to_string(),
            action: "clean logs".to_string(),
            next_step: next.map(|s| s.to_string()),
            confidence: 0.8,
            rollback_step: None,
        }
    }

    fn tree(branches: Vec<DecisionBranch>) -> DecisionTree {
        DecisionTree {
            id: "dt1".to_string(),
            name: "disk".to_string(),
            description: "disk space handling".to_string(),
            branches,
            default_action: "escalate".to_string(),
        }
    }

    #[test]
    fn test_valid_dag_passes() {
        let t = tree(vec![branch("a", Some("b")), branch("b", Some("c")), branch("c", None)]);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_cycle_rejected() {
        let t = tree(vec![branch("a", Some("b")), branch("b", Some("a"))]);
        assert!(matches!(
            t.validate(),
            Err(ValidationError::CyclicDecisionTree { .. })
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let t = tree(vec![branch("a", Some("a"))]);
        assert!(matches!(
            t.validate(),
            Err(ValidationError::CyclicDecisionTree { .. })
        ));
    }

    #[test]
    fn test_dangling_pointer_rejected() {
        let t = tree(vec![branch("a", Some("missing"))]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_duplicate_branch_id_rejected() {
        let t = tree(vec![branch("a", None), branch("a", None)]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_runbook_prerequisite_check() {
        let rb = Runbook {
            id: "rb1".to_string(),
            title: "Disk space".to_string(),
            version: "1".to_string(),
            triggers: vec!["disk_space".to_string()],
            severity_mapping: BTreeMap::new(),
            decision_tree: tree(vec![branch("a", None)]),
            procedures: vec![ProcedureStep {
                id: "p2".to_string(),
                name: "rotate".to_string(),
                description: "rotate logs".to_string(),
                command: None,
                expected_outcome: "space freed".to_string(),
                timeout_seconds: None,
                prerequisites: vec!["p1".to_string()],
                rollback: None,
                tools_required: vec![],
            }],
            escalation_path: None,
            metadata: RunbookMetadata {
                author: "ops".to_string(),
                confidence: 0.9,
                success_rate: None,
                avg_resolution_minutes: None,
                success_count: 0,
            },
            last_updated: Utc::now(),
        };
        assert!(rb.validate().is_err());
    }
}
