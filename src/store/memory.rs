//! In-memory request store.
//!
//! All data is lost when the store is dropped. Suitable for tests and for
//! deployments that rebuild the queue from an upstream system of record;
//! persistent deployments implement `RequestStore` against their database.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::request::state::{AnyChangeRequest, RequestId};
use crate::error::{CountersignError, Result};

use super::{RequestFilter, RequestStore};

/// In-memory implementation of [`RequestStore`] keyed by request id.
#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<RequestId, AnyChangeRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently stored.
    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: AnyChangeRequest) -> Result<()> {
        let id = request.id();
        let mut requests = self.requests.write();
        if requests.contains_key(&id) {
            return Err(CountersignError::Other(anyhow::anyhow!(
                "request {} already exists in store",
                id
            )));
        }
        requests.insert(id, request);
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<AnyChangeRequest> {
        self.requests
            .read()
            .get(&id)
            .cloned()
            .ok_or(CountersignError::NotFound(id))
    }

    async fn put(&self, request: AnyChangeRequest) -> Result<()> {
        let id = request.id();
        let mut requests = self.requests.write();
        if !requests.contains_key(&id) {
            return Err(CountersignError::NotFound(id));
        }
        requests.insert(id, request);
        Ok(())
    }

    async fn list(&self, filter: RequestFilter) -> Result<Vec<AnyChangeRequest>> {
        let mut matching: Vec<AnyChangeRequest> = self
            .requests
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        // Newest first, id as a tiebreaker for a stable order
        matching.sort_by(|a, b| {
            b.data()
                .created_at
                .cmp(&a.data().created_at)
                .then_with(|| b.id().0.cmp(&a.id().0))
        });

        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{Action, Priority};
    use crate::domain::request::state::{ChangeRequest, RequestStateFilter, UserId};
    use crate::domain::request::transitions::SubmissionPolicy;

    fn sample_request(category: &str) -> AnyChangeRequest {
        ChangeRequest::submit(
            UserId::from("maker"),
            Action::new(category, "Test Action", "test"),
            Priority::Normal,
            vec![UserId::from("checker-a"), UserId::from("checker-b")],
            &SubmissionPolicy::default(),
        )
        .unwrap()
        .into()
    }

    #[tokio::test]
    async fn insert_then_get_returns_snapshot() {
        let store = InMemoryRequestStore::new();
        let request = sample_request("user-management");
        let id = request.id();

        store.insert(request).await.unwrap();
        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.id(), id);
        assert!(fetched.is_pending());
    }

    #[tokio::test]
    async fn insert_duplicate_id_fails() {
        let store = InMemoryRequestStore::new();
        let request = sample_request("user-management");
        store.insert(request.clone()).await.unwrap();
        assert!(store.insert(request).await.is_err());
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = InMemoryRequestStore::new();
        let result = store.get(RequestId::new()).await;
        assert!(matches!(result, Err(CountersignError::NotFound(_))));
    }

    #[tokio::test]
    async fn put_requires_existing_request() {
        let store = InMemoryRequestStore::new();
        let request = sample_request("user-management");
        assert!(matches!(
            store.put(request).await,
            Err(CountersignError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_category() {
        let store = InMemoryRequestStore::new();
        store
            .insert(sample_request("user-management"))
            .await
            .unwrap();
        store
            .insert(sample_request("security-configuration"))
            .await
            .unwrap();

        let all = store.list(RequestFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = store
            .list(RequestFilter::status(RequestStateFilter::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let approved = store
            .list(RequestFilter::status(RequestStateFilter::Approved))
            .await
            .unwrap();
        assert!(approved.is_empty());

        let user_mgmt = store
            .list(RequestFilter::category("user-management"))
            .await
            .unwrap();
        assert_eq!(user_mgmt.len(), 1);
        assert_eq!(
            user_mgmt[0].data().action.category.as_str(),
            "user-management"
        );
    }
}
