//! Core types for the authorization engine.
//!
//! This module defines the type-safe change-request lifecycle using the
//! typestate pattern. Each request progresses through distinct states,
//! enforced at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::{Action, ApprovalStatus, Priority};

/// Stored state for filtering and querying change requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStateFilter {
    Pending,
    Approved,
    Rejected,
}

/// Marker trait for valid change-request states.
///
/// This trait enables the typestate pattern, ensuring that operations
/// are only performed on requests in valid states.
pub trait RequestState: Send + Sync {}

/// A change request flowing through the maker-checker chain.
///
/// Uses the typestate pattern to ensure type-safe state transitions.
/// The generic parameter `T` represents the current state of the request.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRequest<T: RequestState> {
    /// The current state of the request.
    pub state: T,
    /// The immutable submission data.
    pub data: RequestData,
}

/// Immutable data fixed when a change request is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestData {
    /// The ID with which the request was submitted.
    pub id: RequestId,

    /// The maker: identity of the user who submitted the request.
    /// Never a member of `required_approvers`.
    pub initiator: UserId,

    /// The requested change, opaque to the engine.
    pub action: Action,

    /// Triage priority.
    pub priority: Priority,

    /// The checkers: every listed identity must approve before the
    /// request's effect is applied. Fixed at creation.
    pub required_approvers: Vec<UserId>,

    /// When the request was submitted.
    pub created_at: DateTime<Utc>,
}

/// One approver's entry in a request's approval chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalEntry {
    pub approver: UserId,
    pub status: ApprovalStatus,
    /// When the approver decided. `None` while pending or not required.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reviewer comment. Required for rejections.
    pub comment: Option<String>,
}

impl ApprovalEntry {
    /// A fresh pending entry for the given approver.
    pub fn pending(approver: UserId) -> Self {
        ApprovalEntry {
            approver,
            status: ApprovalStatus::Pending,
            decided_at: None,
            comment: None,
        }
    }
}

// ============================================================================
// Request States
// ============================================================================

/// Request is awaiting sign-off from one or more approvers.
///
/// This is the initial state for all newly submitted requests.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    /// One entry per required approver, in submission order.
    pub approvals: Vec<ApprovalEntry>,
}

impl RequestState for PendingApproval {}

/// Outcome of invoking the effect applier for an approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EffectStatus {
    /// The approval chain completed but the applier has not been invoked yet.
    Pending,
    /// The effect applier committed the change.
    Applied { applied_at: DateTime<Utc> },
    /// The effect applier failed; the approval stands and application can
    /// be retried by an operator.
    Failed { error: String },
}

/// Every required approver signed off (terminal).
///
/// Approval and execution are separate concerns: `effect` records whether the
/// applier succeeded, and a failed effect can be retried without touching the
/// approval chain.
#[derive(Debug, Clone, Serialize)]
pub struct Approved {
    pub approvals: Vec<ApprovalEntry>,
    pub approved_at: DateTime<Utc>,
    pub effect: EffectStatus,
}

impl RequestState for Approved {}

/// An approver rejected the request (terminal).
///
/// Remaining pending entries are marked `NotRequired`; entries already
/// approved keep their status so the trail reflects what each checker did.
#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub approvals: Vec<ApprovalEntry>,
    pub rejected_by: UserId,
    pub rejected_at: DateTime<Utc>,
}

impl RequestState for Rejected {}

/// Unique identifier for a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Identity of a user acting as maker or checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

// ============================================================================
// Unified Request Representation
// ============================================================================

/// Result of recording a decision on a pending request.
///
/// A decision either leaves the request pending (more approvals outstanding)
/// or moves it to one of the two terminal states.
#[derive(Debug)]
pub enum DecisionOutcome {
    /// More approvals are still outstanding.
    StillPending(ChangeRequest<PendingApproval>),
    /// Every required approver signed off.
    Approved(ChangeRequest<Approved>),
    /// The deciding approver rejected the request.
    Rejected(ChangeRequest<Rejected>),
}

/// Enum that can hold a change request in any state.
///
/// This is used for storage and API responses where we need to handle
/// requests uniformly regardless of their current state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", content = "request")]
pub enum AnyChangeRequest {
    Pending(ChangeRequest<PendingApproval>),
    Approved(ChangeRequest<Approved>),
    Rejected(ChangeRequest<Rejected>),
}

impl AnyChangeRequest {
    /// Get the request ID regardless of state.
    pub fn id(&self) -> RequestId {
        match self {
            AnyChangeRequest::Pending(r) => r.data.id,
            AnyChangeRequest::Approved(r) => r.data.id,
            AnyChangeRequest::Rejected(r) => r.data.id,
        }
    }

    /// Get the variant name of the current state.
    pub fn variant(&self) -> &'static str {
        match self {
            AnyChangeRequest::Pending(_) => "PendingApproval",
            AnyChangeRequest::Approved(_) => "Approved",
            AnyChangeRequest::Rejected(_) => "Rejected",
        }
    }

    /// Get the submission data regardless of state.
    pub fn data(&self) -> &RequestData {
        match self {
            AnyChangeRequest::Pending(r) => &r.data,
            AnyChangeRequest::Approved(r) => &r.data,
            AnyChangeRequest::Rejected(r) => &r.data,
        }
    }

    /// Get the approval chain entries regardless of state.
    pub fn approvals(&self) -> &[ApprovalEntry] {
        match self {
            AnyChangeRequest::Pending(r) => &r.state.approvals,
            AnyChangeRequest::Approved(r) => &r.state.approvals,
            AnyChangeRequest::Rejected(r) => &r.state.approvals,
        }
    }

    /// The filterable state of this request.
    pub fn state_filter(&self) -> RequestStateFilter {
        match self {
            AnyChangeRequest::Pending(_) => RequestStateFilter::Pending,
            AnyChangeRequest::Approved(_) => RequestStateFilter::Approved,
            AnyChangeRequest::Rejected(_) => RequestStateFilter::Rejected,
        }
    }

    /// Check if this request is still awaiting approvals.
    pub fn is_pending(&self) -> bool {
        matches!(self, AnyChangeRequest::Pending(_))
    }

    /// Check if this request is in a terminal state (Approved or Rejected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnyChangeRequest::Approved(_) | AnyChangeRequest::Rejected(_)
        )
    }

    /// Try to extract as a pending request.
    pub fn as_pending(&self) -> Option<&ChangeRequest<PendingApproval>> {
        match self {
            AnyChangeRequest::Pending(r) => Some(r),
            _ => None,
        }
    }

    /// Try to take as a pending request, consuming self.
    pub fn into_pending(self) -> Option<ChangeRequest<PendingApproval>> {
        match self {
            AnyChangeRequest::Pending(r) => Some(r),
            _ => None,
        }
    }

    /// Try to extract as an approved request.
    pub fn as_approved(&self) -> Option<&ChangeRequest<Approved>> {
        match self {
            AnyChangeRequest::Approved(r) => Some(r),
            _ => None,
        }
    }
}

// Conversion traits for going from typed ChangeRequest to AnyChangeRequest

impl From<ChangeRequest<PendingApproval>> for AnyChangeRequest {
    fn from(r: ChangeRequest<PendingApproval>) -> Self {
        AnyChangeRequest::Pending(r)
    }
}

impl From<ChangeRequest<Approved>> for AnyChangeRequest {
    fn from(r: ChangeRequest<Approved>) -> Self {
        AnyChangeRequest::Approved(r)
    }
}

impl From<ChangeRequest<Rejected>> for AnyChangeRequest {
    fn from(r: ChangeRequest<Rejected>) -> Self {
        AnyChangeRequest::Rejected(r)
    }
}

impl From<DecisionOutcome> for AnyChangeRequest {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::StillPending(r) => AnyChangeRequest::Pending(r),
            DecisionOutcome::Approved(r) => AnyChangeRequest::Approved(r),
            DecisionOutcome::Rejected(r) => AnyChangeRequest::Rejected(r),
        }
    }
}
