//! Uplift analysis
//!
//! Works out which revisions an uplift would replicate, without writing
//! anything.

use super::{Phase, ProgressCallback, UpliftContext};
use crate::error::{Error, Result};
use crate::graph::{StackGraph, build_stack_graph};
use crate::landable::{Landability, LandableSubgraph, calculate_landable_subgraphs};
use crate::repos::Repo;
use crate::types::{Phid, RepositoryDescriptor, Revision, RevisionId, UpliftStatus};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// What an uplift would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpliftPlan {
    /// Revision the uplift was requested for
    pub source: Revision,
    /// Target repository on the review service
    pub target: RepositoryDescriptor,
    /// The whole stack of the source revision
    pub graph: StackGraph,
    /// Landability of every stack member on the target
    pub landability: Landability,
    /// Revisions to replicate, dependencies first
    pub selected: LandableSubgraph,
}

impl UpliftPlan {
    /// Selected revisions in replication order
    pub fn selected_revisions(&self) -> Vec<&Revision> {
        self.selected
            .order
            .iter()
            .filter_map(|p| self.graph.revision(p))
            .collect()
    }

    /// Ids of the selected revisions in replication order
    pub fn selected_ids(&self) -> Vec<RevisionId> {
        self.selected_revisions().iter().map(|r| r.id).collect()
    }
}

async fn resolve_target(ctx: &UpliftContext<'_>, repo: &Repo) -> Result<RepositoryDescriptor> {
    if let Some(phid) = &repo.phid {
        return Ok(RepositoryDescriptor {
            phid: phid.clone(),
            short_name: repo.short_name.clone(),
            name: repo.tree.clone(),
        });
    }
    ctx.service
        .search_repository(&repo.short_name)
        .await?
        .ok_or_else(|| {
            Error::RemoteLookupFailed(format!(
                "repository '{}' not found on the review service",
                repo.short_name
            ))
        })
}

async fn resolve_source(ctx: &UpliftContext<'_>, revision_id: RevisionId) -> Result<Revision> {
    ctx.service
        .search_revisions_by_id(&[revision_id])
        .await?
        .into_iter()
        .find(|r| r.id == revision_id)
        .ok_or(Error::RevisionNotFound(revision_id))
}

/// Stack members with an uplift already landed on `repository`
async fn landed_on_target(
    ctx: &UpliftContext<'_>,
    graph: &StackGraph,
    repository: &str,
) -> Result<BTreeSet<Phid>> {
    let mut landed = BTreeSet::new();
    for revision in graph.revisions.values() {
        let existing = ctx.store.find(revision.id, repository).await?;
        if existing.is_some_and(|r| r.status == UpliftStatus::Landed) {
            landed.insert(revision.phid.clone());
        }
    }
    Ok(landed)
}

/// Plan the uplift of `revision_id` onto `repository`
pub async fn analyze_uplift(
    ctx: &UpliftContext<'_>,
    revision_id: RevisionId,
    repository: &str,
    progress: &dyn ProgressCallback,
) -> Result<UpliftPlan> {
    progress.on_phase(Phase::ResolvingRepository).await;
    let repo = ctx.repos.uplift_target(repository)?;
    let target = resolve_target(ctx, repo).await?;
    info!(repository = %target.short_name, phid = %target.phid, "uplift target resolved");

    let source = resolve_source(ctx, revision_id).await?;

    progress.on_phase(Phase::BuildingStack).await;
    let graph = build_stack_graph(ctx.service, &source.phid).await?;
    graph.apply_policy(ctx.options.unresolved_policy)?;

    progress.on_phase(Phase::CalculatingLandability).await;
    let landed = landed_on_target(ctx, &graph, &repo.short_name).await?;
    let landability =
        calculate_landable_subgraphs(&graph, source.repository_phid.as_ref(), repo, &landed);

    let Some(subgraph) = landability.subgraph_containing(&source.phid) else {
        let reason = landability.blocked.get(&source.phid).map_or_else(
            || format!("already landed on {}", repo.short_name),
            ToString::to_string,
        );
        return Err(Error::NothingLandable {
            revision: revision_id,
            reason,
        });
    };
    let selected = if ctx.options.dependencies_only {
        subgraph.restricted_to(&graph.dependencies_closure(&source.phid))
    } else {
        subgraph.clone()
    };
    progress
        .on_message(&format!(
            "{} of {} stack revision(s) selected for {}",
            selected.order.len(),
            graph.nodes.len(),
            target.short_name
        ))
        .await;
    debug!(
        stack = graph.nodes.len(),
        selected = selected.order.len(),
        blocked = landability.blocked.len(),
        "uplift planned"
    );

    Ok(UpliftPlan {
        source,
        target,
        graph,
        landability,
        selected,
    })
}
