//! State transitions for change requests using the typestate pattern.
//!
//! This module implements the approval chain state machine using Rust's type
//! system to enforce valid transitions at compile time. Each request state is
//! represented as a distinct type parameter on `ChangeRequest<State>`.
//!
//! ```text
//! submit() ──> ChangeRequest<PendingApproval>
//!                    │
//!                    ├──record_decision(Approve)──> StillPending   (others outstanding)
//!                    ├──record_decision(Approve)──> ChangeRequest<Approved>   (chain complete)
//!                    └──record_decision(Reject)───> ChangeRequest<Rejected>
//!
//! ChangeRequest<Approved> ──effect_applied()──> effect = Applied
//!                         ──effect_failed()───> effect = Failed   (retryable by operator)
//! ```
//!
//! Transitions here are pure: they consume the typed request and return the
//! next typed state without touching storage. The engine serializes calls per
//! request, persists the result, and invokes collaborators.
//!
//! # Decision Rules
//!
//! - Only identities listed in `required_approvers` may decide, once each.
//! - A rejection must carry a non-empty comment.
//! - A rejection short-circuits: remaining `Pending` entries become
//!   `NotRequired`, entries already `Approved` keep their status so the
//!   chain records what each checker actually did.
//! - The request becomes `Approved` only when every entry is `Approved`.

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::domain::action::{Action, ApprovalStatus, Decision, Priority};
use crate::error::{CountersignError, Result};

use super::state::{
    ApprovalEntry, Approved, ChangeRequest, DecisionOutcome, EffectStatus, PendingApproval,
    Rejected, RequestData, RequestId, UserId,
};

/// Submission-time validation rules for the approver set.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// Minimum number of required approvers. Two-person integrity deployments
    /// set this to 2.
    pub min_approvals: usize,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        SubmissionPolicy { min_approvals: 1 }
    }
}

impl ChangeRequest<PendingApproval> {
    /// Create a new change request in `PendingApproval` with all approval
    /// entries `Pending`.
    ///
    /// Fails with `InvalidApprovers` if the approver set is empty, smaller
    /// than the policy minimum, contains duplicates, or contains the
    /// initiator (separation of duties: the maker can never be a checker on
    /// their own request).
    pub fn submit(
        initiator: UserId,
        action: Action,
        priority: Priority,
        required_approvers: Vec<UserId>,
        policy: &SubmissionPolicy,
    ) -> Result<Self> {
        if required_approvers.is_empty() {
            return Err(CountersignError::InvalidApprovers(
                "at least one approver is required".to_string(),
            ));
        }
        if required_approvers.len() < policy.min_approvals {
            return Err(CountersignError::InvalidApprovers(format!(
                "{} approver(s) given, policy requires at least {}",
                required_approvers.len(),
                policy.min_approvals
            )));
        }
        if required_approvers.contains(&initiator) {
            return Err(CountersignError::InvalidApprovers(format!(
                "initiator '{}' cannot approve their own request",
                initiator
            )));
        }
        for (i, approver) in required_approvers.iter().enumerate() {
            if required_approvers[..i].contains(approver) {
                // A duplicated checker would let one person fill two of the
                // N required slots.
                return Err(CountersignError::InvalidApprovers(format!(
                    "approver '{}' is listed more than once",
                    approver
                )));
            }
        }

        let approvals = required_approvers
            .iter()
            .cloned()
            .map(ApprovalEntry::pending)
            .collect();

        let request = ChangeRequest {
            data: RequestData {
                id: RequestId::new(),
                initiator,
                action,
                priority,
                required_approvers,
                created_at: Utc::now(),
            },
            state: PendingApproval { approvals },
        };

        tracing::info!(
            request_id = %request.data.id,
            initiator = %request.data.initiator,
            category = %request.data.action.category,
            approvers = request.data.required_approvers.len(),
            "Change request submitted"
        );

        Ok(request)
    }

    /// Record one approver's decision, consuming the pending request.
    ///
    /// Returns the resulting state:
    /// - `StillPending` if the decision was an approval and other entries
    ///   remain pending
    /// - `Approved` if this approval completed the chain (the effect applier
    ///   has NOT been invoked yet; the returned state carries
    ///   `EffectStatus::Pending`)
    /// - `Rejected` if the decision was a rejection
    ///
    /// # Errors
    /// - `NotAuthorized` if `approver` is not in `required_approvers`
    /// - `AlreadyDecided` if that approver's entry is no longer pending
    /// - `MissingComment` if `decision` is `Reject` and `comment` is empty
    ///   or whitespace
    pub fn record_decision(
        mut self,
        approver: &UserId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionOutcome> {
        let request_id = self.data.id;

        let Some(entry_idx) = self
            .state
            .approvals
            .iter()
            .position(|e| &e.approver == approver)
        else {
            return Err(CountersignError::NotAuthorized {
                request_id,
                user: approver.clone(),
            });
        };

        if self.state.approvals[entry_idx].status != ApprovalStatus::Pending {
            return Err(CountersignError::AlreadyDecided {
                request_id,
                user: approver.clone(),
            });
        }

        let comment = comment.filter(|c| !c.trim().is_empty());
        if decision == Decision::Reject && comment.is_none() {
            return Err(CountersignError::MissingComment(request_id));
        }

        let now = Utc::now();
        counter!(
            "countersign_decisions_total",
            "category" => self.data.action.category.as_str().to_string(),
            "decision" => decision.as_str()
        )
        .increment(1);

        match decision {
            Decision::Reject => {
                let entry = &mut self.state.approvals[entry_idx];
                entry.status = ApprovalStatus::Rejected;
                entry.decided_at = Some(now);
                entry.comment = comment;

                // Short-circuit: nobody else needs to look at this request.
                for entry in &mut self.state.approvals {
                    if entry.status == ApprovalStatus::Pending {
                        entry.status = ApprovalStatus::NotRequired;
                    }
                }

                tracing::info!(
                    request_id = %request_id,
                    approver = %approver,
                    "Change request rejected"
                );

                Ok(DecisionOutcome::Rejected(ChangeRequest {
                    data: self.data,
                    state: Rejected {
                        approvals: self.state.approvals,
                        rejected_by: approver.clone(),
                        rejected_at: now,
                    },
                }))
            }
            Decision::Approve => {
                let entry = &mut self.state.approvals[entry_idx];
                entry.status = ApprovalStatus::Approved;
                entry.decided_at = Some(now);
                entry.comment = comment;

                let outstanding = self
                    .state
                    .approvals
                    .iter()
                    .filter(|e| e.status == ApprovalStatus::Pending)
                    .count();

                if outstanding == 0 {
                    tracing::info!(
                        request_id = %request_id,
                        approver = %approver,
                        "Approval chain complete"
                    );
                    Ok(DecisionOutcome::Approved(ChangeRequest {
                        data: self.data,
                        state: Approved {
                            approvals: self.state.approvals,
                            approved_at: now,
                            effect: EffectStatus::Pending,
                        },
                    }))
                } else {
                    tracing::debug!(
                        request_id = %request_id,
                        approver = %approver,
                        outstanding,
                        "Approval recorded, chain still pending"
                    );
                    Ok(DecisionOutcome::StillPending(self))
                }
            }
        }
    }
}

impl ChangeRequest<Approved> {
    /// Mark the effect as applied by the effect applier.
    pub fn effect_applied(mut self, applied_at: DateTime<Utc>) -> Self {
        self.state.effect = EffectStatus::Applied { applied_at };
        self
    }

    /// Mark the effect application as failed. The approval stands; operators
    /// can retry application without re-running the chain.
    pub fn effect_failed(mut self, error: String) -> Self {
        counter!("countersign_effect_failures_total").increment(1);
        tracing::warn!(
            request_id = %self.data.id,
            error = %error,
            "Effect application failed for approved request"
        );
        self.state.effect = EffectStatus::Failed { error };
        self
    }

    /// Whether the effect applier still needs to run (initial invocation
    /// failed, or it was never invoked).
    pub fn effect_outstanding(&self) -> bool {
        !matches!(self.state.effect, EffectStatus::Applied { .. })
    }
}
