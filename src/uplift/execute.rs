//! Uplift execution
//!
//! Replicates the planned revisions one at a time, dependencies first.
//! Before any remote call a revision's uplift request is claimed in the
//! store; the store's natural-key uniqueness decides which of two racing
//! runs does the work.

use super::{Phase, ProgressCallback, ReplicationStatus, UpliftContext, UpliftInput, UpliftPlan, analyze_uplift};
use crate::error::{Error, Result};
use crate::graph::UnresolvedPolicy;
use crate::platform::ReviewService;
use crate::request::{NewUpliftRequest, ReplicationTarget, UpliftForm, UpliftRequest};
use crate::revision_data::{ExtendedRevisionData, FetchMode, request_extended_revision_data};
use crate::store::UpliftStore;
use crate::types::{Phid, RepositoryDescriptor, Requester, Revision, RevisionId, Transaction, UpliftStatus};
use crate::validation::ValidatedUplift;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Why a revision was not replicated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A request for the pair already exists in this status
    AlreadyRequested(UpliftStatus),
    /// Another run claimed the pair first
    InProgress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRequested(status) => write!(f, "already requested ({status})"),
            Self::InProgress => write!(f, "claimed by another request"),
        }
    }
}

/// Result for one revision of the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionOutcome {
    /// Diff copied and target revision created or updated
    Replicated(UpliftRequest),
    /// Nothing done for this revision
    Skipped {
        /// Source revision
        revision_id: RevisionId,
        /// Why
        reason: SkipReason,
        /// The existing request, when known
        existing: Option<UpliftRequest>,
    },
    /// Replication failed; the request is now `failed` unless it was moved
    /// to another status while the replication ran
    Failed {
        /// The failed request
        request: UpliftRequest,
        /// Error message
        error: String,
    },
}

impl RevisionOutcome {
    /// Source revision of this outcome
    pub fn revision_id(&self) -> RevisionId {
        match self {
            Self::Replicated(request) | Self::Failed { request, .. } => request.revision_id,
            Self::Skipped { revision_id, .. } => *revision_id,
        }
    }

    /// Uplift request behind this outcome, if any
    pub fn request(&self) -> Option<&UpliftRequest> {
        match self {
            Self::Replicated(request) | Self::Failed { request, .. } => Some(request),
            Self::Skipped { existing, .. } => existing.as_ref(),
        }
    }

    /// Whether replication failed
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn target_revision(&self) -> Option<&Phid> {
        match self {
            Self::Failed { .. } => None,
            _ => self.request().and_then(|r| r.target_revision_phid.as_ref()),
        }
    }
}

/// Result of uplifting one revision stack to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpliftOutcome {
    /// Target repository short name
    pub repository: String,
    /// The plan that was executed
    pub plan: UpliftPlan,
    /// Per-revision results in replication order; empty on a dry run
    pub revisions: Vec<RevisionOutcome>,
    /// Whether this was a dry run
    pub dry_run: bool,
}

impl UpliftOutcome {
    /// Number of replicated revisions
    pub fn replicated_count(&self) -> usize {
        self.revisions
            .iter()
            .filter(|o| matches!(o, RevisionOutcome::Replicated(_)))
            .count()
    }

    /// Number of failed revisions
    pub fn failed_count(&self) -> usize {
        self.revisions.iter().filter(|o| o.is_failed()).count()
    }

    /// Number of skipped revisions
    pub fn skipped_count(&self) -> usize {
        self.revisions
            .iter()
            .filter(|o| matches!(o, RevisionOutcome::Skipped { .. }))
            .count()
    }
}

/// Title of the target-side revision
pub fn uplift_title(revision: &Revision) -> String {
    format!("Uplift request {}: {}", revision.id, revision.title)
}

enum Claim {
    Owned(UpliftRequest),
    Skipped(RevisionOutcome),
}

/// Reserve the (revision, repository) pair before any remote side effect
async fn claim_request(
    store: &dyn UpliftStore,
    revision_id: RevisionId,
    repository: &str,
    form: &UpliftForm,
    requester: &Requester,
) -> Result<Claim> {
    let in_progress = |existing: Option<UpliftRequest>| {
        Claim::Skipped(RevisionOutcome::Skipped {
            revision_id,
            reason: SkipReason::InProgress,
            existing,
        })
    };

    match store.find(revision_id, repository).await? {
        Some(existing) if existing.status == UpliftStatus::Failed => {
            match store
                .transition(existing.id, UpliftStatus::Failed, UpliftStatus::Created)
                .await
            {
                Ok(request) => {
                    info!(revision = %revision_id, repository, "retrying failed uplift");
                    Ok(Claim::Owned(request))
                }
                Err(e) if e.is_conflict() => Ok(in_progress(store.get(existing.id).await?)),
                Err(e) => Err(e),
            }
        }
        Some(existing) => Ok(Claim::Skipped(RevisionOutcome::Skipped {
            revision_id,
            reason: SkipReason::AlreadyRequested(existing.status),
            existing: Some(existing),
        })),
        None => {
            let new = NewUpliftRequest {
                revision_id,
                repository: repository.to_string(),
                form: form.clone(),
                requester_email: requester.email.clone(),
            };
            match store.insert(new).await {
                Ok(request) => Ok(Claim::Owned(request)),
                Err(e) if e.is_conflict() => {
                    Ok(in_progress(store.find(revision_id, repository).await?))
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Copy one revision's diff onto the target repository
async fn replicate(
    service: &dyn ReviewService,
    target: &RepositoryDescriptor,
    data: &ExtendedRevisionData,
    revision: &Revision,
    request: &UpliftRequest,
    parents: &[Phid],
) -> Result<ReplicationTarget> {
    let diff = data.diff_for(&revision.phid).ok_or_else(|| {
        Error::RemoteLookupFailed(format!("no diff found for {}", revision.id))
    })?;

    let raw = service.get_raw_diff(diff.id).await?;
    let diff_phid = service.create_raw_diff(&raw, &target.phid).await?;

    let mut transactions = vec![
        Transaction::new("update", diff_phid.as_str()),
        Transaction::new("title", uplift_title(revision)),
        Transaction::new("summary", request.form.render_summary(revision)),
    ];
    if let Some(bug) = request.form.bug_ids.first().copied().or(revision.bug_id) {
        transactions.push(Transaction::new("bugzilla.bug-id", bug.to_string()));
    }
    if !parents.is_empty() {
        let parents: Vec<&str> = parents.iter().map(Phid::as_str).collect();
        transactions.push(Transaction::new("parents.set", parents));
    }

    let revision = service
        .edit_revision(request.target_revision_phid.as_ref(), &transactions)
        .await?;
    Ok(ReplicationTarget { revision, diff_phid })
}

/// Replicate every revision selected by `plan`
///
/// Only storage failures abort the run; a replication failure is recorded
/// on that revision's request and the run moves on.
pub async fn execute_uplift(
    ctx: &UpliftContext<'_>,
    plan: &UpliftPlan,
    input: &UpliftInput,
    progress: &dyn ProgressCallback,
) -> Result<Vec<RevisionOutcome>> {
    progress.on_phase(Phase::FetchingDiffs).await;
    let mode = match ctx.options.unresolved_policy {
        UnresolvedPolicy::Fail => FetchMode::Strict,
        UnresolvedPolicy::Partial => FetchMode::Partial,
    };
    let data = request_extended_revision_data(ctx.service, &plan.selected.order, mode).await?;

    progress.on_phase(Phase::Replicating).await;
    let repository = plan.target.short_name.as_str();
    // Source revision PHID -> target-side revision PHID
    let mut replicated: BTreeMap<Phid, Phid> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(plan.selected.order.len());

    for revision in plan.selected_revisions() {
        let revision = data.revisions.get(&revision.phid).unwrap_or(revision);

        let outcome = match claim_request(ctx.store, revision.id, repository, &input.form, &input.requester)
            .await?
        {
            Claim::Skipped(outcome) => {
                if let RevisionOutcome::Skipped { reason, .. } = &outcome {
                    progress
                        .on_revision(revision.id, ReplicationStatus::Skipped(reason.to_string()))
                        .await;
                }
                outcome
            }
            Claim::Owned(request) => {
                progress.on_revision(revision.id, ReplicationStatus::Started).await;

                let mut parents = Vec::new();
                for parent in plan.graph.parents_of(&revision.phid) {
                    match replicated.get(parent) {
                        Some(target) => parents.push(target.clone()),
                        None if plan.selected.contains(parent) => {
                            warn!(revision = %revision.id, parent = %parent, "dependency was not replicated");
                            progress
                                .on_message(&format!(
                                    "{} is replicated without its failed dependency",
                                    revision.id
                                ))
                                .await;
                        }
                        None => {}
                    }
                }

                match replicate(ctx.service, &plan.target, &data, revision, &request, &parents).await {
                    Ok(target) => {
                        let request = ctx.store.record_replication(request.id, &target).await?;
                        info!(revision = %revision.id, target = %target.revision.id, repository, "replicated");
                        progress
                            .on_revision(revision.id, ReplicationStatus::Replicated(target.revision))
                            .await;
                        RevisionOutcome::Replicated(request)
                    }
                    Err(e) => {
                        warn!(revision = %revision.id, repository, error = %e, "replication failed");
                        progress.on_error(&e).await;
                        let error = e.to_string();
                        let request = record_failure(ctx.store, request, &error).await?;
                        progress
                            .on_revision(revision.id, ReplicationStatus::Failed(error.clone()))
                            .await;
                        RevisionOutcome::Failed { request, error }
                    }
                }
            }
        };

        if let Some(target) = outcome.target_revision() {
            replicated.insert(revision.phid.clone(), target.clone());
        }
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Mark `request` as failed
///
/// A request moved out of `created` by someone else meanwhile (rejected,
/// for instance) keeps its new status.
async fn record_failure(
    store: &dyn UpliftStore,
    request: UpliftRequest,
    error: &str,
) -> Result<UpliftRequest> {
    match store.record_failure(request.id, error).await {
        Ok(failed) => Ok(failed),
        Err(e @ (Error::InvalidTransition { .. } | Error::Conflict { .. })) => {
            warn!(request = request.id, error = %e, "request changed while replicating; failure not recorded");
            Ok(store.get(request.id).await?.unwrap_or(request))
        }
        Err(e) => Err(e),
    }
}

/// Uplift one revision and the landable part of its stack to one repository
pub async fn create_uplift_revision(
    ctx: &UpliftContext<'_>,
    input: &UpliftInput,
    progress: &dyn ProgressCallback,
) -> Result<UpliftOutcome> {
    let plan = analyze_uplift(ctx, input.revision_id, &input.repository, progress).await?;

    let revisions = if ctx.options.dry_run {
        Vec::new()
    } else {
        execute_uplift(ctx, &plan, input, progress).await?
    };

    progress.on_phase(Phase::Complete).await;
    Ok(UpliftOutcome {
        repository: plan.target.short_name.clone(),
        plan,
        revisions,
        dry_run: ctx.options.dry_run,
    })
}

/// Uplift a validated request to each of its repositories, in order
///
/// Stops at the first repository that fails as a whole; per-revision
/// failures are reported in the outcomes.
pub async fn create_uplift_requests(
    ctx: &UpliftContext<'_>,
    uplift: &ValidatedUplift,
    requester: &Requester,
    progress: &dyn ProgressCallback,
) -> Result<Vec<UpliftOutcome>> {
    let mut outcomes = Vec::with_capacity(uplift.repositories.len());
    for repository in &uplift.repositories {
        let input = UpliftInput {
            revision_id: uplift.revision_id,
            repository: repository.clone(),
            form: uplift.form.clone(),
            requester: requester.clone(),
        };
        outcomes.push(create_uplift_revision(ctx, &input, progress).await?);
    }
    Ok(outcomes)
}
