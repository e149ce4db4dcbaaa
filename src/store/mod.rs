//! Storage traits for the authorization engine.
//!
//! This module defines the `RequestStore` trait, which provides the keyed
//! collection of change requests the approval chain engine operates on.

use async_trait::async_trait;

use crate::domain::action::ActionCategory;
use crate::domain::request::state::{AnyChangeRequest, RequestId, RequestStateFilter};
use crate::error::Result;

pub mod memory;

pub use memory::InMemoryRequestStore;

/// Filter for listing change requests.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Only requests in this state.
    pub status: Option<RequestStateFilter>,
    /// Only requests whose action carries this category.
    pub category: Option<ActionCategory>,
}

impl RequestFilter {
    pub fn status(status: RequestStateFilter) -> Self {
        RequestFilter {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn category(category: impl Into<ActionCategory>) -> Self {
        RequestFilter {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    /// Whether the given request snapshot matches this filter.
    pub fn matches(&self, request: &AnyChangeRequest) -> bool {
        if let Some(status) = self.status
            && request.state_filter() != status
        {
            return false;
        }
        if let Some(category) = &self.category
            && &request.data().action.category != category
        {
            return false;
        }
        true
    }
}

/// Store trait for persisting and querying change requests.
///
/// Single-writer discipline: only the approval chain engine calls `insert`
/// and `put`, and it does so under the per-request serialization lock.
/// External readers (UI/API) use `get`/`list` and receive owned snapshots.
/// Requests are never deleted; terminal requests stay queryable.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Add a newly submitted request.
    ///
    /// Fails if a request with the same id is already stored.
    async fn insert(&self, request: AnyChangeRequest) -> Result<()>;

    /// Get a request snapshot by id.
    async fn get(&self, id: RequestId) -> Result<AnyChangeRequest>;

    /// Replace an existing request's stored state.
    ///
    /// Used only by the engine after a successful transition.
    async fn put(&self, request: AnyChangeRequest) -> Result<()>;

    /// List request snapshots matching the filter, newest first.
    async fn list(&self, filter: RequestFilter) -> Result<Vec<AnyChangeRequest>>;
}
