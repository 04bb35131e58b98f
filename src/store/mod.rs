//! Uplift request persistence
//!
//! Every backend enforces uniqueness of the `(revision, repository)` pair
//! and applies status changes as compare-and-set, so concurrent callers
//! racing on the same pair see exactly one winner. [`SqliteStore`] holds
//! that across processes sharing one database file.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{Error, Result};
use crate::request::{NewUpliftRequest, ReplicationTarget, UpliftRequest};
use crate::types::{RevisionId, UpliftStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

/// Filter for [`UpliftStore::list`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Only requests for this source revision
    pub revision_id: Option<RevisionId>,
    /// Only requests targeting this repository
    pub repository: Option<String>,
    /// Only requests in this status
    pub status: Option<UpliftStatus>,
}

impl RequestFilter {
    fn matches(&self, request: &UpliftRequest) -> bool {
        self.revision_id.is_none_or(|id| request.revision_id == id)
            && self
                .repository
                .as_deref()
                .is_none_or(|repo| request.repository == repo)
            && self.status.is_none_or(|status| request.status == status)
    }
}

/// Storage for uplift requests
#[async_trait]
pub trait UpliftStore: Send + Sync {
    /// Insert a new request in status `created`
    ///
    /// Fails with [`Error::Conflict`] if a request for the same
    /// `(revision, repository)` pair already exists.
    async fn insert(&self, request: NewUpliftRequest) -> Result<UpliftRequest>;

    /// Request by id
    async fn get(&self, id: u64) -> Result<Option<UpliftRequest>>;

    /// Request by natural key
    async fn find(&self, revision_id: RevisionId, repository: &str) -> Result<Option<UpliftRequest>>;

    /// Requests matching `filter`, ordered by id
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<UpliftRequest>>;

    /// Move request `id` from `expected` to `next`
    ///
    /// Fails with [`Error::Conflict`] if the stored status is no longer
    /// `expected`, and with [`Error::InvalidTransition`] if the lifecycle
    /// does not allow the change.
    async fn transition(&self, id: u64, expected: UpliftStatus, next: UpliftStatus) -> Result<UpliftRequest>;

    /// Attach the target-side revision and diff
    async fn record_replication(&self, id: u64, target: &ReplicationTarget) -> Result<UpliftRequest>;

    /// Move to `failed` and keep `message`
    async fn record_failure(&self, id: u64, message: &str) -> Result<UpliftRequest>;
}

/// Request table behind [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RequestTable {
    next_id: u64,
    requests: BTreeMap<u64, UpliftRequest>,
    by_key: BTreeMap<(RevisionId, String), u64>,
}

impl RequestTable {
    fn find(&self, revision_id: RevisionId, repository: &str) -> Option<&UpliftRequest> {
        self.by_key
            .get(&(revision_id, repository.to_string()))
            .and_then(|id| self.requests.get(id))
    }

    fn insert(&mut self, new: NewUpliftRequest) -> Result<UpliftRequest> {
        if self.find(new.revision_id, &new.repository).is_some() {
            return Err(Error::Conflict {
                revision_id: new.revision_id,
                repository: new.repository,
            });
        }
        self.next_id += 1;
        let request = new.into_request(self.next_id, Utc::now());
        self.by_key
            .insert((request.revision_id, request.repository.clone()), request.id);
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut UpliftRequest> {
        self.requests.get_mut(&id).ok_or(Error::RequestNotFound(id))
    }

    fn list(&self, filter: &RequestFilter) -> Vec<UpliftRequest> {
        self.requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    fn transition(&mut self, id: u64, expected: UpliftStatus, next: UpliftStatus) -> Result<UpliftRequest> {
        let request = self.get_mut(id)?;
        if request.status != expected {
            return Err(Error::Conflict {
                revision_id: request.revision_id,
                repository: request.repository.clone(),
            });
        }
        request.transition(next)?;
        Ok(request.clone())
    }

    fn record_replication(&mut self, id: u64, target: &ReplicationTarget) -> Result<UpliftRequest> {
        let request = self.get_mut(id)?;
        request.record_replication(target);
        Ok(request.clone())
    }

    fn record_failure(&mut self, id: u64, message: &str) -> Result<UpliftRequest> {
        let request = self.get_mut(id)?;
        request.record_failure(message)?;
        Ok(request.clone())
    }
}
