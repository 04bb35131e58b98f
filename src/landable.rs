//! Landability of stack revisions on a target repository
//!
//! Partitions a [`StackGraph`] into landable subgraphs, each with a
//! dependencies-first order, and reports every revision that cannot be
//! landed together with the reason.

use crate::graph::StackGraph;
use crate::repos::Repo;
use crate::types::{Phid, RevisionId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;

/// Why a revision is excluded from every landable subgraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The review service could not resolve the revision
    Unresolved,
    /// The revision was abandoned
    Abandoned,
    /// The revision belongs to a different repository than the source revision
    WrongRepository {
        /// Repository of the revision, if any
        found: Option<Phid>,
    },
    /// A dependency is unknown and not verified as landed
    MissingDependency(Phid),
    /// A dependency is itself blocked
    BlockedDependency(Phid),
    /// The revision's stack component contains a cycle
    Cycle,
    /// The target repository does not accept uplifts
    TargetNotEligible(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => write!(f, "revision could not be resolved"),
            Self::Abandoned => write!(f, "revision is abandoned"),
            Self::WrongRepository { found: Some(repo) } => {
                write!(f, "revision belongs to another repository ({repo})")
            }
            Self::WrongRepository { found: None } => write!(f, "revision has no repository"),
            Self::MissingDependency(phid) => write!(f, "dependency {phid} is missing"),
            Self::BlockedDependency(phid) => write!(f, "dependency {phid} is blocked"),
            Self::Cycle => write!(f, "stack contains a dependency cycle"),
            Self::TargetNotEligible(repo) => {
                write!(f, "repository {repo} does not accept uplifts")
            }
        }
    }
}

/// A connected set of revisions that can land together, dependencies first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandableSubgraph {
    /// Topological order; every dependency precedes its dependents
    pub order: Vec<Phid>,
    /// Repository the subgraph can land on
    pub target_repository: String,
}

impl LandableSubgraph {
    /// Whether `phid` is part of the subgraph
    pub fn contains(&self, phid: &Phid) -> bool {
        self.order.contains(phid)
    }

    /// Restrict to `keep`, preserving order
    pub fn restricted_to(&self, keep: &BTreeSet<Phid>) -> Self {
        Self {
            order: self
                .order
                .iter()
                .filter(|p| keep.contains(*p))
                .cloned()
                .collect(),
            target_repository: self.target_repository.clone(),
        }
    }
}

/// Result of a landability calculation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Landability {
    /// Landable subgraphs, ordered by their smallest revision id
    pub subgraphs: Vec<LandableSubgraph>,
    /// Revisions that cannot land, with the reason
    pub blocked: BTreeMap<Phid, BlockReason>,
    /// Revisions already landed on the target; they satisfy dependencies
    pub landed: BTreeSet<Phid>,
}

impl Landability {
    /// The subgraph containing `phid`
    pub fn subgraph_containing(&self, phid: &Phid) -> Option<&LandableSubgraph> {
        self.subgraphs.iter().find(|s| s.contains(phid))
    }

    /// True when nothing can land
    pub fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }
}

/// Compute the landable subgraphs of `graph` for `target`
///
/// `source_repository` is the repository of the revision the uplift was
/// requested for; stack members from other repositories are blocked.
/// `landed_on_target` holds revisions verified as already landed on the
/// target; they satisfy their dependents and are not part of any subgraph.
/// Ties in the topological order are broken by ascending revision id.
pub fn calculate_landable_subgraphs(
    graph: &StackGraph,
    source_repository: Option<&Phid>,
    target: &Repo,
    landed_on_target: &BTreeSet<Phid>,
) -> Landability {
    let mut result = Landability::default();
    let mut candidates: BTreeSet<&Phid> = BTreeSet::new();

    for phid in &graph.nodes {
        let Some(revision) = graph.revision(phid) else {
            result.blocked.insert(phid.clone(), BlockReason::Unresolved);
            continue;
        };
        if landed_on_target.contains(phid) {
            result.landed.insert(phid.clone());
        } else if revision.status.is_abandoned() {
            result.blocked.insert(phid.clone(), BlockReason::Abandoned);
        } else if !target.approval_required {
            result.blocked.insert(
                phid.clone(),
                BlockReason::TargetNotEligible(target.short_name.clone()),
            );
        } else if source_repository.is_some_and(|s| revision.repository_phid.as_ref() != Some(s)) {
            result.blocked.insert(
                phid.clone(),
                BlockReason::WrongRepository {
                    found: revision.repository_phid.clone(),
                },
            );
        } else {
            candidates.insert(phid);
        }
    }

    // Components with a cycle cannot be ordered at all
    let all: BTreeSet<&Phid> = graph.nodes.iter().collect();
    let mut order = Vec::with_capacity(all.len());
    for component in components(graph, &all) {
        match topo_order(graph, &component) {
            Some(mut sorted) => order.append(&mut sorted),
            None => {
                for phid in component {
                    if !result.landed.contains(phid) {
                        candidates.remove(phid);
                        result.blocked.insert(phid.clone(), BlockReason::Cycle);
                    }
                }
            }
        }
    }

    // Dependencies first, so a parent's final state is known before its children
    for phid in &order {
        if !candidates.contains(phid) {
            continue;
        }
        let blocker = graph.parents_of(phid).find_map(|parent| {
            if result.landed.contains(parent) || candidates.contains(parent) {
                None
            } else if matches!(result.blocked.get(parent), Some(BlockReason::Unresolved)) {
                Some(BlockReason::MissingDependency(parent.clone()))
            } else {
                Some(BlockReason::BlockedDependency(parent.clone()))
            }
        });
        if let Some(reason) = blocker {
            candidates.remove(phid);
            result.blocked.insert(phid.clone(), reason);
        }
    }

    let mut subgraphs: Vec<(RevisionId, LandableSubgraph)> = components(graph, &candidates)
        .into_iter()
        .filter_map(|component| {
            let order = topo_order(graph, &component)?;
            let first = order.iter().map(|p| sort_key(graph, p)).min()?;
            Some((
                first,
                LandableSubgraph {
                    order,
                    target_repository: target.short_name.clone(),
                },
            ))
        })
        .collect();
    subgraphs.sort_by_key(|(first, _)| *first);
    result.subgraphs = subgraphs.into_iter().map(|(_, s)| s).collect();
    result
}

fn sort_key(graph: &StackGraph, phid: &Phid) -> RevisionId {
    graph
        .revision(phid)
        .map_or(RevisionId(u64::MAX), |r| r.id)
}

/// Weakly connected components of `members`, using only edges inside `members`
fn components<'a>(graph: &'a StackGraph, members: &BTreeSet<&'a Phid>) -> Vec<BTreeSet<&'a Phid>> {
    let mut seen: BTreeSet<&Phid> = BTreeSet::new();
    let mut result = Vec::new();

    for &start in members {
        if seen.contains(start) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut queue = vec![start];
        while let Some(phid) = queue.pop() {
            if !seen.insert(phid) {
                continue;
            }
            component.insert(phid);
            queue.extend(
                graph
                    .parents_of(phid)
                    .chain(graph.children_of(phid))
                    .filter(|p| members.contains(*p) && !seen.contains(*p)),
            );
        }
        result.push(component);
    }
    result
}

/// Kahn's algorithm over `members`, smallest revision id first; `None` on a cycle
fn topo_order(graph: &StackGraph, members: &BTreeSet<&Phid>) -> Option<Vec<Phid>> {
    let mut in_degree: BTreeMap<&Phid, usize> = members
        .iter()
        .map(|&p| (p, graph.parents_of(p).filter(|d| members.contains(*d)).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<(RevisionId, &Phid)>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(&p, _)| Reverse((sort_key(graph, p), p)))
        .collect();

    let mut order = Vec::with_capacity(members.len());
    while let Some(Reverse((_, phid))) = ready.pop() {
        order.push(phid.clone());
        for child in graph.children_of(phid) {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((sort_key(graph, child), child)));
                }
            }
        }
    }

    (order.len() == members.len()).then_some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Revision, RevisionStatus};

    const REPO: &str = "PHID-REPO-central";

    fn phid(n: u64) -> Phid {
        Phid::from(format!("PHID-DREV-{n}"))
    }

    fn revision(n: u64, status: RevisionStatus, repo: &str) -> Revision {
        Revision {
            id: RevisionId(n),
            phid: phid(n),
            title: format!("revision {n}"),
            status,
            repository_phid: Some(Phid::from(repo)),
            diff_phid: Phid::from(format!("PHID-DIFF-{n}")),
            bug_id: None,
        }
    }

    fn graph(revs: Vec<Revision>, extra_nodes: &[u64], edges: &[(u64, u64)]) -> StackGraph {
        let mut nodes: BTreeSet<Phid> = revs.iter().map(|r| r.phid.clone()).collect();
        nodes.extend(extra_nodes.iter().map(|n| phid(*n)));
        StackGraph::from_parts(
            nodes,
            edges.iter().map(|(a, b)| (phid(*a), phid(*b))).collect(),
            revs.into_iter().map(|r| (r.phid.clone(), r)).collect(),
        )
        .unwrap()
    }

    fn beta() -> Repo {
        Repo::new("mozilla-beta", true)
    }

    fn accepted(n: u64) -> Revision {
        revision(n, RevisionStatus::Accepted, REPO)
    }

    #[test]
    fn test_linear_stack_orders_dependencies_first() {
        let g = graph(vec![accepted(100), accepted(99)], &[], &[(100, 99)]);
        let result = calculate_landable_subgraphs(&g, Some(&Phid::from(REPO)), &beta(), &BTreeSet::new());
        assert_eq!(result.subgraphs.len(), 1);
        assert_eq!(result.subgraphs[0].order, vec![phid(99), phid(100)]);
        assert_eq!(result.subgraphs[0].target_repository, "mozilla-beta");
        assert!(result.blocked.is_empty());
    }

    #[test]
    fn test_ties_break_by_revision_id() {
        // 5 and 3 both depend on 1; 4 depends on both
        let g = graph(
            vec![accepted(1), accepted(5), accepted(3), accepted(4)],
            &[],
            &[(5, 1), (3, 1), (4, 5), (4, 3)],
        );
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        assert_eq!(
            result.subgraphs[0].order,
            vec![phid(1), phid(3), phid(5), phid(4)]
        );
    }

    #[test]
    fn test_landed_dependency_is_satisfied() {
        let g = graph(vec![accepted(1), accepted(2)], &[], &[(2, 1)]);
        let landed = BTreeSet::from([phid(1)]);
        let result = calculate_landable_subgraphs(&g, None, &beta(), &landed);
        assert_eq!(result.subgraphs.len(), 1);
        assert_eq!(result.subgraphs[0].order, vec![phid(2)]);
        assert!(result.landed.contains(&phid(1)));
    }

    #[test]
    fn test_published_on_source_is_still_uplifted() {
        let g = graph(
            vec![revision(1, RevisionStatus::Published, REPO), accepted(2)],
            &[],
            &[(2, 1)],
        );
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        assert_eq!(result.subgraphs[0].order, vec![phid(1), phid(2)]);
        assert!(result.landed.is_empty());
    }

    #[test]
    fn test_abandoned_blocks_dependents() {
        let g = graph(
            vec![
                revision(1, RevisionStatus::Abandoned, REPO),
                accepted(2),
                accepted(3),
            ],
            &[],
            &[(2, 1), (3, 2)],
        );
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        assert!(result.is_empty());
        assert_eq!(result.blocked.get(&phid(1)), Some(&BlockReason::Abandoned));
        assert_eq!(
            result.blocked.get(&phid(2)),
            Some(&BlockReason::BlockedDependency(phid(1)))
        );
        assert_eq!(
            result.blocked.get(&phid(3)),
            Some(&BlockReason::BlockedDependency(phid(2)))
        );
    }

    #[test]
    fn test_unresolved_dependency_is_missing() {
        let g = graph(vec![accepted(2)], &[1], &[(2, 1)]);
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        assert_eq!(result.blocked.get(&phid(1)), Some(&BlockReason::Unresolved));
        assert_eq!(
            result.blocked.get(&phid(2)),
            Some(&BlockReason::MissingDependency(phid(1)))
        );
    }

    #[test]
    fn test_other_repository_is_blocked() {
        let g = graph(
            vec![accepted(1), revision(2, RevisionStatus::Accepted, "PHID-REPO-other")],
            &[],
            &[],
        );
        let result = calculate_landable_subgraphs(&g, Some(&Phid::from(REPO)), &beta(), &BTreeSet::new());
        assert_eq!(result.subgraphs.len(), 1);
        assert_eq!(result.subgraphs[0].order, vec![phid(1)]);
        assert!(matches!(
            result.blocked.get(&phid(2)),
            Some(BlockReason::WrongRepository { .. })
        ));
    }

    #[test]
    fn test_cycle_component_excluded_other_component_kept() {
        let g = graph(
            vec![accepted(1), accepted(2), accepted(7)],
            &[],
            &[(1, 2), (2, 1)],
        );
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        assert_eq!(result.subgraphs.len(), 1);
        assert_eq!(result.subgraphs[0].order, vec![phid(7)]);
        assert_eq!(result.blocked.get(&phid(1)), Some(&BlockReason::Cycle));
        assert_eq!(result.blocked.get(&phid(2)), Some(&BlockReason::Cycle));
    }

    #[test]
    fn test_target_without_approval_blocks_everything() {
        let g = graph(vec![accepted(1)], &[], &[]);
        let result = calculate_landable_subgraphs(
            &g,
            None,
            &Repo::new("mozilla-central", false),
            &BTreeSet::new(),
        );
        assert!(result.is_empty());
        assert_eq!(
            result.blocked.get(&phid(1)),
            Some(&BlockReason::TargetNotEligible("mozilla-central".into()))
        );
    }

    #[test]
    fn test_independent_components_sorted_by_smallest_id() {
        let g = graph(
            vec![accepted(10), accepted(11), accepted(4), accepted(6)],
            &[],
            &[(11, 10), (6, 4)],
        );
        let result = calculate_landable_subgraphs(&g, None, &beta(), &BTreeSet::new());
        let orders: Vec<_> = result.subgraphs.iter().map(|s| s.order.clone()).collect();
        assert_eq!(
            orders,
            vec![vec![phid(4), phid(6)], vec![phid(10), phid(11)]]
        );
    }

    #[test]
    fn test_restricted_to_keeps_order() {
        let sub = LandableSubgraph {
            order: vec![phid(1), phid(2), phid(3)],
            target_repository: "mozilla-beta".into(),
        };
        let keep = BTreeSet::from([phid(3), phid(1)]);
        assert_eq!(sub.restricted_to(&keep).order, vec![phid(1), phid(3)]);
    }
}
