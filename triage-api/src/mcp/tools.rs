//! MCP tool definitions
//!
//! The seven operations exposed over the tool-call protocol, each with a
//! JSON Schema used to validate arguments before dispatch.

use super::types::Tool;
use jsonschema::Validator;
use once_cell::sync::Lazy;

/// A tool definition plus its compiled argument validator.
pub struct RegisteredTool {
    pub tool: Tool,
    pub validator: Validator,
}

fn tool(name: &str, description: &str, schema: serde_json::Value) -> RegisteredTool {
    let validator = jsonschema::validator_for(&schema).expect("static tool schema");
    RegisteredTool {
        tool: Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
        },
        validator,
    }
}

/// The full tool catalogue.
pub static TOOLS: Lazy<Vec<RegisteredTool>> = Lazy::new(|| {
    vec![
        tool(
            "search-runbooks",
            "Find runbooks matching an alert signature (type, severity, affected systems)",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "alert_type": {
                        "type": "string",
                        "description": "Alert type, e.g. disk_space"
                    },
                    "severity": {
                        "type": "string",
                        "enum": ["info", "low", "medium", "high", "critical"],
                        "description": "Alert severity"
                    },
                    "affected_systems": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Systems the alert fired on"
                    },
                    "context": {
                        "type": "object",
                        "description": "Optional free-form incident context"
                    }
                },
                "required": ["alert_type", "severity", "affected_systems"]
            }),
        ),
        tool(
            "get-decision-tree",
            "Retrieve a runbook's decision tree, optionally ordered for a scenario",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "runbook_id": {
                        "type": "string",
                        "description": "Runbook identifier"
                    },
                    "scenario": {
                        "type": "string",
                        "description": "Optional scenario text used to rank branches"
                    }
                },
                "required": ["runbook_id"]
            }),
        ),
        tool(
            "get-procedure",
            "Retrieve one procedure step by id (<runbook-id>_<step-name>)",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "procedure_id": {
                        "type": "string",
                        "description": "Procedure id in <runbook-id>_<step-name> form"
                    }
                },
                "required": ["procedure_id"]
            }),
        ),
        tool(
            "get-escalation-path",
            "Resolve escalation contacts and procedure for a severity",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "severity": {
                        "type": "string",
                        "enum": ["info", "low", "medium", "high", "critical"]
                    },
                    "system": {
                        "type": "string",
                        "description": "Optional affected system"
                    },
                    "business_hours": {
                        "type": "boolean",
                        "description": "Override the wall-clock business-hours flag"
                    },
                    "failed_attempts": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Resolution attempts already made"
                    }
                },
                "required": ["severity"]
            }),
        ),
        tool(
            "list-sources",
            "List every documentation source with health and metadata",
            serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        ),
        tool(
            "search-knowledge-base",
            "Free-text search across all documentation sources",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "categories": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["runbook", "procedure", "guide", "general"]
                        },
                        "description": "Restrict to these document categories"
                    },
                    "max_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 100,
                        "description": "Maximum results to return"
                    }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "record-resolution-feedback",
            "Record the outcome of applying a runbook procedure",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "runbook_id": {"type": "string"},
                    "procedure_id": {"type": "string"},
                    "outcome": {
                        "type": "string",
                        "enum": ["success", "partial_success", "failure", "escalated"]
                    },
                    "resolution_time_minutes": {
                        "type": "number",
                        "minimum": 0
                    },
                    "notes": {"type": "string"}
                },
                "required": ["runbook_id", "procedure_id", "outcome", "resolution_time_minutes"]
            }),
        ),
    ]
});

/// Find a registered tool by name.
pub fn find(name: &str) -> Option<&'static RegisteredTool> {
    TOOLS.iter().find(|t| t.tool.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_seven_tools_registered() {
        let names: Vec<&str> = TOOLS.iter().map(|t| t.tool.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "search-runbooks",
                "get-decision-tree",
                "get-procedure",
                "get-escalation-path",
                "list-sources",
                "search-knowledge-base",
                "record-resolution-feedback",
            ]
        );
    }

    #[test]
    fn test_schema_validation_catches_missing_fields() {
        let tool = find("search-runbooks").unwrap();
        let incomplete = serde_json::json!({"alert_type": "disk_space"});
        assert!(!tool.validator.is_valid(&incomplete));

        let complete = serde_json::json!({
            "alert_type": "disk_space",
            "severity": "critical",
            "affected_systems": ["web-01"]
        });
        assert!(tool.validator.is_valid(&complete));
    }

    #[test]
    fn test_schema_validation_rejects_bad_enum() {
        let tool = find("get-escalation-path").unwrap();
        let bad = serde_json::json!({"severity": "catastrophic"});
        assert!(!tool.validator.is_valid(&bad));
    }

    #[test]
    fn test_unknown_tool_is_none() {
        assert!(find("drop-tables").is_none());
    }
}
