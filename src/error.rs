//! Error types for the authorization engine.

use thiserror::Error;

use crate::domain::request::state::{RequestId, UserId};

/// Result type alias using the countersign error type.
pub type Result<T> = std::result::Result<T, CountersignError>;

/// Main error type for the authorization engine.
///
/// Every variant is recoverable and reportable to the caller; none is fatal
/// to the engine. Authorization failures are kept distinct from
/// [`EffectApplicationFailed`](CountersignError::EffectApplicationFailed) so
/// operators can retry effect application without re-running approval.
#[derive(Error, Debug)]
pub enum CountersignError {
    /// Change request not found
    #[error("Change request not found: {0}")]
    NotFound(RequestId),

    /// The acting user is not one of the request's required approvers
    #[error("User '{user}' is not a required approver for request {request_id}")]
    NotAuthorized { request_id: RequestId, user: UserId },

    /// The approver has already recorded a decision on this request
    #[error("Approver '{user}' has already decided on request {request_id}")]
    AlreadyDecided { request_id: RequestId, user: UserId },

    /// The request has already reached a terminal state
    #[error("Request {0} is already {1}; no further decisions are accepted")]
    RequestTerminal(RequestId, String),

    /// A rejection was attempted without a justifying comment
    #[error("Rejection of request {0} requires a comment")]
    MissingComment(RequestId),

    /// The approver set supplied at submission is unusable
    #[error("Invalid approver set: {0}")]
    InvalidApprovers(String),

    /// The approval chain completed but the effect applier failed.
    ///
    /// The request remains `Approved`; approval and execution are separate
    /// concerns. Retry via `ApprovalEngine::retry_effect`.
    #[error("Effect application failed for approved request {request_id}: {source}")]
    EffectApplicationFailed {
        request_id: RequestId,
        #[source]
        source: anyhow::Error,
    },

    /// Request is in an invalid state for the requested operation
    #[error("Invalid state: request {0} is in state '{1}', expected '{2}'")]
    InvalidState(RequestId, String, String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
