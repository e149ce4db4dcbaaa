//! Audit trail emission for terminal transitions.
//!
//! Every change request that reaches `Approved` or `Rejected` produces an
//! audit event. The engine treats the emitter as fire-and-forget: emission
//! failures are logged and never block or roll back a state transition.
//! The in-memory log doubles as the query backend for audit viewers, with
//! filtered reads and JSONL export.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::request::state::{RequestId, UserId};
use crate::error::Result;

/// Terminal outcome recorded in an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Approved,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Approved => "approved",
            AuditOutcome::Rejected => "rejected",
        }
    }
}

/// One audit trail entry for a terminal transition.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// The request that reached a terminal state.
    pub request_id: RequestId,
    /// The approver whose decision completed the chain.
    pub actor: UserId,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
    /// Category of the affected action, for filtered review.
    pub category: String,
    /// The deciding approver's comment, when one was recorded.
    pub comment: Option<String>,
}

/// Trait for recording audit events.
///
/// Invoked by the engine on every terminal transition. Implementations must
/// be non-blocking-friendly; a failure here is logged by the engine and the
/// state transition stands.
#[async_trait]
pub trait AuditEmitter: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

// ============================================================================
// In-Memory Append-Only Log
// ============================================================================

/// Filter for querying recorded audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only events recorded by this actor.
    pub actor: Option<UserId>,
    /// Only events with this outcome.
    pub outcome: Option<AuditOutcome>,
    /// Only events at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only events at or before this instant.
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(actor) = &self.actor
            && &event.actor != actor
        {
            return false;
        }
        if let Some(outcome) = self.outcome
            && event.outcome != outcome
        {
            return false;
        }
        if let Some(from) = self.from
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to
            && event.timestamp > to
        {
            return false;
        }
        true
    }
}

/// Append-only in-memory audit log.
///
/// Events are never updated or deleted. Supports filtered queries by actor,
/// outcome, and time range, and JSONL export for offline review.
#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in emission order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Events matching the filter, in emission order.
    pub fn list(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Export events matching the filter as JSON Lines, one event per line.
    pub fn export_jsonl(&self, filter: &AuditFilter) -> Result<String> {
        let events = self.events.read();
        let mut out = String::new();
        for event in events.iter().filter(|e| filter.matches(e)) {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl AuditEmitter for InMemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        tracing::debug!(
            request_id = %event.request_id,
            actor = %event.actor,
            outcome = event.outcome.as_str(),
            "Audit event recorded"
        );
        self.events.write().push(event);
        Ok(())
    }
}
