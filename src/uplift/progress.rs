//! Progress callback trait for interface-agnostic updates
//!
//! Lets the CLI (or any other front end) follow an uplift while it runs
//! without the orchestrator knowing how progress is displayed.

use crate::error::Error;
use crate::types::{RevisionId, RevisionRef};
use async_trait::async_trait;

/// Uplift phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Checking the target repository
    ResolvingRepository,
    /// Discovering the revision stack
    BuildingStack,
    /// Working out what can be uplifted
    CalculatingLandability,
    /// Loading diffs of the selected revisions
    FetchingDiffs,
    /// Copying diffs onto the target repository
    Replicating,
    /// Uplift complete
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolvingRepository => write!(f, "Resolving repository"),
            Self::BuildingStack => write!(f, "Building stack"),
            Self::CalculatingLandability => write!(f, "Calculating landability"),
            Self::FetchingDiffs => write!(f, "Fetching diffs"),
            Self::Replicating => write!(f, "Replicating"),
            Self::Complete => write!(f, "Done"),
        }
    }
}

/// Per-revision replication status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStatus {
    /// Replication started
    Started,
    /// Target revision created or updated
    Replicated(RevisionRef),
    /// Nothing done, with the reason
    Skipped(String),
    /// Replication failed with error message
    Failed(String),
}

impl std::fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Replicated(target) => write!(f, "replicated as {}", target.id),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Progress callback trait
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    /// Called when entering a new phase
    async fn on_phase(&self, phase: Phase);

    /// Called when a revision changes replication status
    async fn on_revision(&self, revision: RevisionId, status: ReplicationStatus);

    /// Called when an error occurs (non-fatal)
    async fn on_error(&self, error: &Error);

    /// Called with a general status message
    async fn on_message(&self, message: &str);
}

/// No-op progress callback for testing or when progress isn't needed
pub struct NoopProgress;

#[async_trait]
impl ProgressCallback for NoopProgress {
    async fn on_phase(&self, _phase: Phase) {}
    async fn on_revision(&self, _revision: RevisionId, _status: ReplicationStatus) {}
    async fn on_error(&self, _error: &Error) {}
    async fn on_message(&self, _message: &str) {}
}
