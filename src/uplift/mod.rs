//! Uplift orchestration
//!
//! Replicates a reviewed revision, together with the landable part of its
//! stack, onto an approval-gated repository:
//! 1. Analysis - resolve the target, build the stack, select what can land
//! 2. Execution - copy each diff in dependency order and record the outcome
//!
//! Each revision is tracked by its own uplift request; a failure on one
//! revision never rolls back the others.

mod analysis;
mod execute;
mod progress;

pub use analysis::{UpliftPlan, analyze_uplift};
pub use execute::{
    RevisionOutcome, SkipReason, UpliftOutcome, create_uplift_requests, create_uplift_revision,
    execute_uplift, uplift_title,
};
pub use progress::{NoopProgress, Phase, ProgressCallback, ReplicationStatus};

use crate::graph::UnresolvedPolicy;
use crate::platform::ReviewService;
use crate::repos::RepoConfig;
use crate::request::UpliftForm;
use crate::store::UpliftStore;
use crate::types::{Requester, RevisionId};

/// Behaviour switches for an uplift run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpliftOptions {
    /// What to do with stack members the review service cannot resolve
    pub unresolved_policy: UnresolvedPolicy,
    /// Stop after planning; nothing is written locally or remotely
    pub dry_run: bool,
    /// Only replicate the source revision and its dependencies, leaving
    /// revisions stacked on top of it behind
    pub dependencies_only: bool,
}

/// Collaborators of the orchestrator
#[derive(Clone, Copy)]
pub struct UpliftContext<'a> {
    /// Review service client, already authenticated
    pub service: &'a dyn ReviewService,
    /// Uplift request storage
    pub store: &'a dyn UpliftStore,
    /// Repositories of the current environment
    pub repos: &'a RepoConfig,
    /// Run options
    pub options: UpliftOptions,
}

/// One uplift of one revision to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpliftInput {
    /// Source revision
    pub revision_id: RevisionId,
    /// Target repository short name
    pub repository: String,
    /// Form answers
    pub form: UpliftForm,
    /// Authenticated requester
    pub requester: Requester,
}
