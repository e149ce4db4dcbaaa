//! Approval chain engine with per-request decision serialization.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::audit::{AuditEmitter, AuditEvent, AuditOutcome};
use crate::domain::action::{Action, Decision, Priority};
use crate::domain::request::state::{
    AnyChangeRequest, ChangeRequest, DecisionOutcome, RequestId, RequestStateFilter, UserId,
};
use crate::domain::request::transitions::SubmissionPolicy;
use crate::effect::EffectApplier;
use crate::error::{CountersignError, Result};
use crate::store::{RequestFilter, RequestStore};

/// Configuration for the approval chain engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum time to wait for a request's decision lock before giving up
    /// (milliseconds). Decisions on one request serialize; this bounds the
    /// wait so no caller blocks indefinitely.
    pub lock_timeout_ms: u64,

    /// Minimum number of required approvers accepted at submission.
    /// Two-person integrity deployments set this to 2.
    pub min_approvals: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000, // 5 seconds
            min_approvals: 1,
        }
    }
}

/// Queue summary counts for dashboard views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Pending requests carrying `Priority::Urgent`.
    pub urgent_pending: usize,
}

/// The approval chain engine.
///
/// Owns the request store and drives the maker-checker state machine.
/// Decisions on the same request serialize through a per-request lock, so
/// two simultaneous approvals cannot both observe a pending chain and race
/// to flip it; a decision that loses the race sees the committed state and
/// fails with `RequestTerminal` or `AlreadyDecided`.
///
/// Collaborators are invoked on terminal transitions only: the effect
/// applier exactly once when the chain completes, the audit emitter on every
/// terminal outcome. Audit failures are logged and never block a transition.
pub struct ApprovalEngine<S, E, A>
where
    S: RequestStore,
    E: EffectApplier,
    A: AuditEmitter,
{
    store: Arc<S>,
    effect: Arc<E>,
    audit: Arc<A>,
    config: EngineConfig,
    /// Per-request decision locks. Entries are dropped once a request is
    /// terminal; a late caller recreates one only to observe the terminal
    /// state and fail.
    request_locks: Arc<dashmap::DashMap<RequestId, Arc<Mutex<()>>>>,
}

impl<S, E, A> ApprovalEngine<S, E, A>
where
    S: RequestStore,
    E: EffectApplier,
    A: AuditEmitter,
{
    /// Create a new engine with the default configuration.
    ///
    /// Customize with `.with_config()` if needed.
    pub fn new(store: Arc<S>, effect: Arc<E>, audit: Arc<A>) -> Self {
        Self {
            store,
            effect,
            audit,
            config: EngineConfig::default(),
            request_locks: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submit a new change request on behalf of `initiator`.
    ///
    /// The request enters `PendingApproval` with one pending entry per
    /// required approver.
    ///
    /// # Errors
    /// `InvalidApprovers` if the approver set is empty, below the configured
    /// minimum, contains duplicates, or contains the initiator.
    #[tracing::instrument(skip(self, action), fields(initiator = %initiator, category = %action.category))]
    pub async fn submit_request(
        &self,
        initiator: UserId,
        action: Action,
        priority: Priority,
        required_approvers: Vec<UserId>,
    ) -> Result<AnyChangeRequest> {
        let policy = SubmissionPolicy {
            min_approvals: self.config.min_approvals,
        };
        let request =
            ChangeRequest::submit(initiator, action, priority, required_approvers, &policy)?;

        let snapshot = AnyChangeRequest::from(request);
        self.store.insert(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Record one approver's decision on a pending request.
    ///
    /// Runs the read-modify-write under the request's decision lock, so
    /// concurrent decisions for the same request serialize and exactly one
    /// ordering commits.
    ///
    /// On the transition to `Approved`, the effect applier is invoked once;
    /// if it fails the approval stands (`EffectStatus::Failed`) and the call
    /// returns `EffectApplicationFailed` for operator remediation. The audit
    /// emitter fires on every terminal outcome.
    ///
    /// Returns the updated request snapshot.
    #[tracing::instrument(skip(self, comment), fields(request_id = %request_id, approver = %approver, decision = decision.as_str()))]
    pub async fn record_decision(
        &self,
        request_id: RequestId,
        approver: &UserId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<AnyChangeRequest> {
        let _guard = self.lock_request(request_id).await?;

        let stored = self.store.get(request_id).await?;
        let pending = match stored {
            AnyChangeRequest::Pending(r) => r,
            terminal => {
                self.request_locks.remove(&request_id);
                return Err(CountersignError::RequestTerminal(
                    request_id,
                    terminal.variant().to_string(),
                ));
            }
        };

        match pending.record_decision(approver, decision, comment)? {
            DecisionOutcome::StillPending(request) => {
                let snapshot = AnyChangeRequest::from(request);
                self.store.put(snapshot.clone()).await?;
                Ok(snapshot)
            }
            DecisionOutcome::Rejected(request) => {
                let snapshot = AnyChangeRequest::from(request);
                self.store.put(snapshot.clone()).await?;
                self.emit_audit(&snapshot, approver, AuditOutcome::Rejected)
                    .await;
                self.request_locks.remove(&request_id);
                Ok(snapshot)
            }
            DecisionOutcome::Approved(request) => {
                // Approval and execution are separate concerns: the chain is
                // complete regardless of whether the applier succeeds.
                let apply_result = self.effect.apply(&request.data).await;
                let (request, effect_error) = match apply_result {
                    Ok(()) => (request.effect_applied(Utc::now()), None),
                    Err(e) => {
                        let message = e.to_string();
                        (request.effect_failed(message), Some(e))
                    }
                };

                let snapshot = AnyChangeRequest::from(request);
                self.store.put(snapshot.clone()).await?;
                self.emit_audit(&snapshot, approver, AuditOutcome::Approved)
                    .await;
                self.request_locks.remove(&request_id);

                match effect_error {
                    None => Ok(snapshot),
                    Some(source) => Err(CountersignError::EffectApplicationFailed {
                        request_id,
                        source: anyhow::Error::new(source),
                    }),
                }
            }
        }
    }

    /// Re-invoke the effect applier for an approved request whose effect
    /// previously failed.
    ///
    /// Operator remediation for `EffectApplicationFailed`: the approval chain
    /// is not re-run.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids
    /// - `InvalidState` if the request is not `Approved`, or its effect was
    ///   already applied
    /// - `EffectApplicationFailed` if the applier fails again
    #[tracing::instrument(skip(self), fields(request_id = %request_id))]
    pub async fn retry_effect(&self, request_id: RequestId) -> Result<AnyChangeRequest> {
        let _guard = self.lock_request(request_id).await?;

        let stored = self.store.get(request_id).await?;
        let approved = match stored {
            AnyChangeRequest::Approved(r) if r.effect_outstanding() => r,
            AnyChangeRequest::Approved(_) => {
                return Err(CountersignError::InvalidState(
                    request_id,
                    "Approved (effect applied)".to_string(),
                    "Approved with outstanding effect".to_string(),
                ));
            }
            other => {
                return Err(CountersignError::InvalidState(
                    request_id,
                    other.variant().to_string(),
                    "Approved with outstanding effect".to_string(),
                ));
            }
        };

        match self.effect.apply(&approved.data).await {
            Ok(()) => {
                let snapshot = AnyChangeRequest::from(approved.effect_applied(Utc::now()));
                self.store.put(snapshot.clone()).await?;
                self.request_locks.remove(&request_id);
                tracing::info!(request_id = %request_id, "Effect applied on retry");
                Ok(snapshot)
            }
            Err(e) => {
                let snapshot = AnyChangeRequest::from(approved.effect_failed(e.to_string()));
                self.store.put(snapshot).await?;
                Err(CountersignError::EffectApplicationFailed {
                    request_id,
                    source: anyhow::Error::new(e),
                })
            }
        }
    }

    /// Get a request snapshot by id.
    pub async fn get(&self, request_id: RequestId) -> Result<AnyChangeRequest> {
        self.store.get(request_id).await
    }

    /// List request snapshots matching the filter, newest first.
    pub async fn list(&self, filter: RequestFilter) -> Result<Vec<AnyChangeRequest>> {
        self.store.list(filter).await
    }

    /// Queue summary counts for dashboard views.
    pub async fn stats(&self) -> Result<QueueStats> {
        let requests = self.store.list(RequestFilter::default()).await?;
        let mut stats = QueueStats {
            pending: 0,
            approved: 0,
            rejected: 0,
            urgent_pending: 0,
        };
        for request in &requests {
            match request.state_filter() {
                RequestStateFilter::Pending => {
                    stats.pending += 1;
                    if request.data().priority == Priority::Urgent {
                        stats.urgent_pending += 1;
                    }
                }
                RequestStateFilter::Approved => stats.approved += 1,
                RequestStateFilter::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }

    /// Acquire the decision lock for a request, waiting at most
    /// `lock_timeout_ms`.
    ///
    /// The guard releases on drop on every exit path, including collaborator
    /// failure.
    async fn lock_request(&self, request_id: RequestId) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .request_locks
            .entry(request_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(
            Duration::from_millis(self.config.lock_timeout_ms),
            lock.lock_owned(),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "timed out after {}ms waiting for decision lock on request {}",
                self.config.lock_timeout_ms,
                request_id
            )
            .into()
        })
    }

    /// Emit an audit event for a terminal transition. Failures are logged;
    /// the transition stands.
    async fn emit_audit(&self, request: &AnyChangeRequest, actor: &UserId, outcome: AuditOutcome) {
        let comment = request
            .approvals()
            .iter()
            .find(|e| &e.approver == actor)
            .and_then(|e| e.comment.clone());

        let event = AuditEvent {
            request_id: request.id(),
            actor: actor.clone(),
            outcome,
            timestamp: Utc::now(),
            category: request.data().action.category.as_str().to_string(),
            comment,
        };

        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(
                request_id = %request.id(),
                outcome = outcome.as_str(),
                error = %e,
                "Audit emission failed; state transition stands"
            );
        }
    }
}
