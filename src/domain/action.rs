//! Action descriptors carried by change requests.
//!
//! The engine never interprets an action: it is an opaque descriptor handed
//! to the effect applier once the approval chain completes. Category and
//! priority exist only so requests can be filtered and triaged in queue views.

use serde::{Deserialize, Serialize};

/// Category of a requested change (e.g. "user-management",
/// "security-configuration"). Opaque to the engine; used for list filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCategory(pub String);

impl ActionCategory {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionCategory {
    fn from(s: &str) -> Self {
        ActionCategory(s.to_string())
    }
}

impl From<String> for ActionCategory {
    fn from(s: String) -> Self {
        ActionCategory(s)
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The change a request asks to perform, passed through to the effect applier
/// unexamined by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Filtering/routing key (e.g. "user-management")
    pub category: ActionCategory,

    /// Short human-readable title (e.g. "Create New User Account")
    pub name: String,

    /// Longer description shown to reviewers
    pub description: String,

    /// Structured change payload, interpreted only by the effect applier
    pub payload: serde_json::Value,
}

impl Action {
    /// Convenience constructor for actions without a structured payload.
    pub fn new(
        category: impl Into<ActionCategory>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Action {
            category: category.into(),
            name: name.into(),
            description: description.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Triage priority of a change request.
///
/// Carried opaquely alongside the action; surfaced in queue listings and
/// stats but never consulted by the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// A checker's verdict on a pending change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// Per-approver entry status within a request's approval chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting this approver's decision
    Pending,
    /// Approver signed off
    Approved,
    /// Approver rejected (short-circuits the chain)
    Rejected,
    /// Chain was rejected by someone else before this approver decided
    NotRequired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::NotRequired => "not_required",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            "not_required" => Ok(ApprovalStatus::NotRequired),
            _ => Err(format!("Invalid approval status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_status_round_trips_through_str() {
        for status in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
            ApprovalStatus::NotRequired,
        ] {
            assert_eq!(status.as_str().parse::<ApprovalStatus>().unwrap(), status);
        }
        assert!("nope".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn action_builder_sets_payload() {
        let action = Action::new("user-management", "Create User", "create alice")
            .with_payload(serde_json::json!({"username": "alice"}));
        assert_eq!(action.category.as_str(), "user-management");
        assert_eq!(action.payload["username"], "alice");
    }
}
