use super::{RequestFilter, RequestTable, UpliftStore};
use crate::error::Result;
use crate::request::{NewUpliftRequest, ReplicationTarget, UpliftRequest};
use crate::types::{RevisionId, UpliftStatus};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<RequestTable>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UpliftStore for MemoryStore {
    async fn insert(&self, request: NewUpliftRequest) -> Result<UpliftRequest> {
        self.table.lock().await.insert(request)
    }

    async fn get(&self, id: u64) -> Result<Option<UpliftRequest>> {
        Ok(self.table.lock().await.requests.get(&id).cloned())
    }

    async fn find(&self, revision_id: RevisionId, repository: &str) -> Result<Option<UpliftRequest>> {
        Ok(self.table.lock().await.find(revision_id, repository).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<UpliftRequest>> {
        Ok(self.table.lock().await.list(filter))
    }

    async fn transition(&self, id: u64, expected: UpliftStatus, next: UpliftStatus) -> Result<UpliftRequest> {
        self.table.lock().await.transition(id, expected, next)
    }

    async fn record_replication(&self, id: u64, target: &ReplicationTarget) -> Result<UpliftRequest> {
        self.table.lock().await.record_replication(id, target)
    }

    async fn record_failure(&self, id: u64, message: &str) -> Result<UpliftRequest> {
        self.table.lock().await.record_failure(id, message)
    }
}
