//! Maker-checker dual-authorization engine for back-office change requests.
//!
//! This crate provides an approval chain engine that accepts submitted change
//! requests and enforces N-of-N distinct-approver sign-off before a request's
//! effect is committed. The submitter (maker) can never approve their own
//! request; a single rejection short-circuits the chain. Applying the approved
//! change and recording audit events are delegated to collaborator traits.
//!
//! Decisions on the same request serialize through per-request locks, so
//! racing approvals resolve deterministically and each decision is processed
//! at most once.

pub mod audit;
pub mod domain;
pub mod effect;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use audit::{AuditEmitter, AuditEvent, AuditFilter, AuditOutcome, InMemoryAuditLog};
pub use domain::action::{Action, ActionCategory, ApprovalStatus, Decision, Priority};
pub use domain::request::state::{
    AnyChangeRequest, ApprovalEntry, Approved, ChangeRequest, DecisionOutcome, EffectStatus,
    PendingApproval, Rejected, RequestData, RequestId, RequestState, RequestStateFilter, UserId,
};
pub use domain::request::transitions::SubmissionPolicy;
pub use effect::{EffectApplier, LoggingEffectApplier, MockEffectApplier};
pub use engine::{ApprovalEngine, EngineConfig, QueueStats};
pub use error::{CountersignError, Result};
pub use store::{InMemoryRequestStore, RequestFilter, RequestStore};
