//! Review service adapter
//!
//! Provides a typed interface over the review service's query and mutation
//! operations, so the stack builder and the uplift orchestrator never deal
//! with wire formats.

mod conduit;
mod factory;
mod retry;

pub use conduit::{ConduitService, DEFAULT_TIMEOUT_SECS};
pub use factory::create_review_service;
pub use retry::RetryPolicy;

use crate::error::Result;
use crate::types::{
    DiffDescriptor, DiffId, Phid, RepositoryDescriptor, Requester, Revision, RevisionId,
    RevisionRef, Transaction,
};
use async_trait::async_trait;

/// Kind of relationship reported between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// `source` depends on `destination`
    Parent,
    /// `destination` depends on `source`
    Child,
}

/// One relationship reported by the review service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEdge {
    /// Revision the edge was queried from
    pub source: Phid,
    /// Related revision
    pub destination: Phid,
    /// Direction of the relationship
    pub kind: EdgeKind,
}

impl RevisionEdge {
    /// Normalize to a `(dependent, dependency)` pair
    pub fn as_dependency(&self) -> (Phid, Phid) {
        match self.kind {
            EdgeKind::Parent => (self.source.clone(), self.destination.clone()),
            EdgeKind::Child => (self.destination.clone(), self.source.clone()),
        }
    }
}

/// Review service operations used by the uplift workflow
///
/// Implementations own transport concerns (authentication, retries,
/// timeouts). Lookups that find nothing return empty collections or `None`;
/// only transport and service failures are errors.
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Find a repository by short name
    async fn search_repository(&self, short_name: &str) -> Result<Option<RepositoryDescriptor>>;

    /// Fetch revisions by numeric id
    async fn search_revisions_by_id(&self, ids: &[RevisionId]) -> Result<Vec<Revision>>;

    /// Fetch revisions by PHID
    async fn search_revisions_by_phid(&self, phids: &[Phid]) -> Result<Vec<Revision>>;

    /// Fetch parent and child edges for every revision in `phids`
    async fn search_edges(&self, phids: &[Phid]) -> Result<Vec<RevisionEdge>>;

    /// Fetch diff metadata by PHID
    async fn search_diffs(&self, phids: &[Phid]) -> Result<Vec<DiffDescriptor>>;

    /// Fetch the raw patch text of a diff
    async fn get_raw_diff(&self, diff_id: DiffId) -> Result<String>;

    /// Upload a raw patch against a repository, returning the new diff PHID
    async fn create_raw_diff(&self, diff: &str, repository: &Phid) -> Result<Phid>;

    /// Apply transactions to a revision; `None` creates a new revision
    async fn edit_revision(
        &self,
        object: Option<&Phid>,
        transactions: &[Transaction],
    ) -> Result<RevisionRef>;

    /// Identity owning the API token
    async fn whoami(&self) -> Result<Requester>;

    /// Web URL of a revision, for display
    fn revision_url(&self, id: RevisionId) -> String;
}
