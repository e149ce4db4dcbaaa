//! Effect applier abstraction.
//!
//! This module defines the `EffectApplier` trait to abstract the system that
//! performs the actual business mutation once authorization completes,
//! enabling testability with mock implementations. The engine invokes the
//! applier exactly once on the transition to `Approved`; failures surface as
//! `EffectApplicationFailed` without rolling back the approval.

use crate::domain::request::state::RequestData;
use crate::error::Result;
use async_trait::async_trait;

/// Trait for applying an approved change request's effect.
///
/// Implementations interpret `request.action` (the engine never does) and
/// commit the described change to the downstream system.
///
/// # Example
/// ```ignore
/// let applier = LoggingEffectApplier::new();
/// applier.apply(&request.data).await?;
/// ```
#[async_trait]
pub trait EffectApplier: Send + Sync {
    /// Apply the change described by the request's action.
    ///
    /// # Errors
    /// Returns an error if the downstream mutation fails. The engine records
    /// the failure on the approved request and surfaces
    /// `EffectApplicationFailed` for operator remediation.
    async fn apply(&self, request: &RequestData) -> Result<()>;
}

// ============================================================================
// Production Placeholder Implementation
// ============================================================================

/// Effect applier that logs the approved action and succeeds.
///
/// Stands in for a real downstream integration during development and in
/// deployments where application is handled out of band.
#[derive(Debug, Clone, Default)]
pub struct LoggingEffectApplier;

impl LoggingEffectApplier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EffectApplier for LoggingEffectApplier {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, category = %request.action.category))]
    async fn apply(&self, request: &RequestData) -> Result<()> {
        tracing::info!(
            request_id = %request.id,
            action = %request.action.name,
            category = %request.action.category,
            "Applying approved change"
        );
        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::request::state::RequestId;

/// Mock effect applier for testing.
///
/// Records every invocation and returns scripted outcomes per request id
/// without mutating anything. Unscripted requests succeed by default, so
/// tests only script the failures they care about.
///
/// # Example
/// ```ignore
/// let mock = MockEffectApplier::new();
/// mock.fail_next(request_id, "downstream unavailable");
/// // ... drive the engine ...
/// assert_eq!(mock.apply_count(), 1);
/// ```
#[derive(Default)]
pub struct MockEffectApplier {
    /// Scripted failures per request id, consumed in FIFO order.
    failures: Mutex<HashMap<RequestId, Vec<String>>>,
    calls: Mutex<Vec<AppliedCall>>,
}

/// Record of a call made to the mock effect applier.
#[derive(Debug, Clone)]
pub struct AppliedCall {
    pub request_id: RequestId,
    pub category: String,
    pub action_name: String,
}

impl MockEffectApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `apply` call for this request to fail with the given
    /// message. Multiple scripted failures are consumed in order; once the
    /// queue is empty, calls succeed again.
    pub fn fail_next(&self, request_id: RequestId, error: &str) {
        self.failures
            .lock()
            .entry(request_id)
            .or_default()
            .push(error.to_string());
    }

    /// Get all calls that have been made to this applier.
    pub fn get_calls(&self) -> Vec<AppliedCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn apply_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of apply calls recorded for a specific request.
    pub fn apply_count_for(&self, request_id: RequestId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.request_id == request_id)
            .count()
    }
}

#[async_trait]
impl EffectApplier for MockEffectApplier {
    async fn apply(&self, request: &RequestData) -> Result<()> {
        self.calls.lock().push(AppliedCall {
            request_id: request.id,
            category: request.action.category.as_str().to_string(),
            action_name: request.action.name.clone(),
        });

        let scripted = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&request.id) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match scripted {
            Some(error) => Err(anyhow::anyhow!(error).into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{Action, Priority};
    use crate::domain::request::state::UserId;
    use chrono::Utc;

    fn request_data() -> RequestData {
        RequestData {
            id: RequestId::new(),
            initiator: UserId::from("maker"),
            action: Action::new("user-management", "Create User", "create alice"),
            priority: Priority::Normal,
            required_approvers: vec![UserId::from("checker")],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_applier_records_calls_and_succeeds_by_default() {
        let mock = MockEffectApplier::new();
        let data = request_data();

        mock.apply(&data).await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request_id, data.id);
        assert_eq!(calls[0].category, "user-management");
        assert_eq!(calls[0].action_name, "Create User");
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let mock = MockEffectApplier::new();
        let data = request_data();

        mock.fail_next(data.id, "downstream unavailable");

        assert!(mock.apply(&data).await.is_err());
        // Queue drained: next call succeeds
        assert!(mock.apply(&data).await.is_ok());
        assert_eq!(mock.apply_count_for(data.id), 2);
    }

    #[tokio::test]
    async fn logging_applier_always_succeeds() {
        let applier = LoggingEffectApplier::new();
        assert!(applier.apply(&request_data()).await.is_ok());
    }
}
