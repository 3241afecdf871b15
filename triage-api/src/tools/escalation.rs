//! Escalation policy table
//!
//! Built-in severity x business-hours matrix. Repeated failed attempts
//! bump the effective severity one level before the lookup.

use triage_core::{EscalationContact, EscalationPlan, Severity};

fn contact(name: &str, role: &str, handle: &str) -> EscalationContact {
    EscalationContact {
        name: name.to_string(),
        role: role.to_string(),
        contact: handle.to_string(),
    }
}

/// Failed attempts at or above this bump severity one level.
const ESCALATE_AFTER_ATTEMPTS: u32 = 2;

/// Bump severity one level after repeated failed attempts.
pub fn effective_severity(severity: Severity, failed_attempts: Option<u32>) -> Severity {
    if failed_attempts.unwrap_or(0) < ESCALATE_AFTER_ATTEMPTS {
        return severity;
    }
    match severity {
        Severity::Info => Severity::Low,
        Severity::Low => Severity::Medium,
        Severity::Medium => Severity::High,
        Severity::High | Severity::Critical => Severity::Critical,
    }
}

/// Resolve the escalation plan for a severity and business-hours flag.
pub fn plan_for(severity: Severity, business_hours: bool) -> EscalationPlan {
    match (severity, business_hours) {
        (Severity::Critical, _) => EscalationPlan {
            severity,
            contacts: vec![
                contact("Primary on-call", "incident commander", "pager:oncall-primary"),
                contact("Secondary on-call", "responder", "pager:oncall-secondary"),
                contact("Engineering manager", "escalation owner", "slack:#incident-bridge"),
            ],
            procedure: "Page the primary on-call immediately. Open the incident bridge, \
                        declare severity, and begin the runbook. Page the secondary if \
                        no acknowledgement within 5 minutes."
                .to_string(),
            estimated_response_minutes: 5,
        },
        (Severity::High, true) => EscalationPlan {
            severity,
            contacts: vec![
                contact("Primary on-call", "responder", "pager:oncall-primary"),
                contact("Service owner", "subject expert", "slack:#svc-owners"),
            ],
            procedure: "Page the primary on-call and notify the owning team channel. \
                        Escalate to the incident bridge if impact spreads."
                .to_string(),
            estimated_response_minutes: 15,
        },
        (Severity::High, false) => EscalationPlan {
            severity,
            contacts: vec![contact(
                "Primary on-call",
                "responder",
                "pager:oncall-primary",
            )],
            procedure: "Page the primary on-call. Defer owner notification to the next \
                        business day unless impact grows."
                .to_string(),
            estimated_response_minutes: 30,
        },
        (Severity::Medium, true) => EscalationPlan {
            severity,
            contacts: vec![contact("Service owner", "subject expert", "slack:#svc-owners")],
            procedure: "Post in the owning team channel with the alert details and \
                        current findings."
                .to_string(),
            estimated_response_minutes: 60,
        },
        (Severity::Medium, false) => EscalationPlan {
            severity,
            contacts: vec![contact("On-call queue", "triage", "queue:ops-triage")],
            procedure: "File in the triage queue; the on-call reviews it at the start \
                        of the next business day."
                .to_string(),
            estimated_response_minutes: 240,
        },
        (Severity::Low | Severity::Info, _) => EscalationPlan {
            severity,
            contacts: vec![contact("Ops triage", "triage", "queue:ops-triage")],
            procedure: "File a ticket in the triage queue with the alert details."
                .to_string(),
            estimated_response_minutes: 480,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_is_paged_day_and_night() {
        let day = plan_for(Severity::Critical, true);
        let night = plan_for(Severity::Critical, false);
        assert_eq!(day.estimated_response_minutes, 5);
        assert_eq!(night.estimated_response_minutes, 5);
        assert!(day.contacts.len() >= 2);
    }

    #[test]
    fn test_off_hours_slows_medium() {
        let day = plan_for(Severity::Medium, true);
        let night = plan_for(Severity::Medium, false);
        assert!(night.estimated_response_minutes > day.estimated_response_minutes);
    }

    #[test]
    fn test_failed_attempts_bump_severity() {
        assert_eq!(effective_severity(Severity::Medium, Some(2)), Severity::High);
        assert_eq!(effective_severity(Severity::Medium, Some(1)), Severity::Medium);
        assert_eq!(effective_severity(Severity::Medium, None), Severity::Medium);
        assert_eq!(
            effective_severity(Severity::Critical, Some(5)),
            Severity::Critical
        );
    }
}
