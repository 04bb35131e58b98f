//! Revision stack discovery
//!
//! A stack is every revision connected to a starting revision through
//! dependency edges, in either direction. Edges are stored as
//! `(dependent, dependency)` pairs: the dependent cannot land before the
//! dependency.

use crate::error::{GraphIntegrityError, Result};
use crate::platform::ReviewService;
use crate::types::{Phid, Revision, RevisionId};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

/// Upper bound on revisions discovered for one stack
pub const MAX_STACK_SIZE: usize = 1000;

/// What to do with revisions the review service could not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Fail the whole operation
    #[default]
    Fail,
    /// Keep going; unresolved revisions are never landable
    Partial,
}

/// A revision stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackGraph {
    /// Every revision PHID in the stack
    pub nodes: BTreeSet<Phid>,
    /// `(dependent, dependency)` pairs between members of `nodes`
    pub edges: BTreeSet<(Phid, Phid)>,
    /// Resolved revision data, keyed by PHID
    pub revisions: BTreeMap<Phid, Revision>,
    /// Nodes the review service could not resolve
    pub unresolved: BTreeSet<Phid>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Expanding,
    Done,
}

impl StackGraph {
    /// Assemble a graph from parts, checking that every edge endpoint is a node
    ///
    /// Nodes without an entry in `revisions` are marked unresolved.
    pub fn from_parts(
        nodes: BTreeSet<Phid>,
        edges: BTreeSet<(Phid, Phid)>,
        revisions: BTreeMap<Phid, Revision>,
    ) -> std::result::Result<Self, GraphIntegrityError> {
        for (dependent, dependency) in &edges {
            for phid in [dependent, dependency] {
                if !nodes.contains(phid) {
                    return Err(GraphIntegrityError::DanglingEdge(phid.clone()));
                }
            }
        }
        let unresolved = nodes
            .iter()
            .filter(|p| !revisions.contains_key(*p))
            .cloned()
            .collect();
        let revisions = revisions
            .into_iter()
            .filter(|(p, _)| nodes.contains(p))
            .collect();
        Ok(Self {
            nodes,
            edges,
            revisions,
            unresolved,
        })
    }

    /// Revisions `phid` depends on
    pub fn parents_of<'a>(&'a self, phid: &'a Phid) -> impl Iterator<Item = &'a Phid> + 'a {
        self.edges
            .iter()
            .filter(move |(dependent, _)| dependent == phid)
            .map(|(_, dependency)| dependency)
    }

    /// Revisions depending on `phid`
    pub fn children_of<'a>(&'a self, phid: &'a Phid) -> impl Iterator<Item = &'a Phid> + 'a {
        self.edges
            .iter()
            .filter(move |(_, dependency)| dependency == phid)
            .map(|(dependent, _)| dependent)
    }

    /// Nodes without dependencies
    pub fn roots(&self) -> BTreeSet<&Phid> {
        self.nodes
            .iter()
            .filter(|p| self.parents_of(p).next().is_none())
            .collect()
    }

    /// Nodes nothing depends on
    pub fn heads(&self) -> BTreeSet<&Phid> {
        self.nodes
            .iter()
            .filter(|p| self.children_of(p).next().is_none())
            .collect()
    }

    /// Resolved revision for `phid`
    pub fn revision(&self, phid: &Phid) -> Option<&Revision> {
        self.revisions.get(phid)
    }

    /// PHID of the revision with numeric id `id`
    pub fn phid_for(&self, id: RevisionId) -> Option<&Phid> {
        self.revisions
            .values()
            .find(|r| r.id == id)
            .map(|r| &r.phid)
    }

    /// `phid` plus everything it transitively depends on
    pub fn dependencies_closure(&self, phid: &Phid) -> BTreeSet<Phid> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([phid.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.parents_of(&current).cloned());
        }
        seen
    }

    /// Fail on the first dependency cycle found
    ///
    /// Depth-first over dependency edges; a node is `Expanding` while its
    /// dependencies are being walked. Reaching an `Expanding` node again
    /// closes a cycle.
    pub fn check_acyclic(&self) -> std::result::Result<(), GraphIntegrityError> {
        let mut marks: BTreeMap<&Phid, Mark> = BTreeMap::new();

        for start in &self.nodes {
            if marks.contains_key(start) {
                continue;
            }
            marks.insert(start, Mark::Expanding);
            let mut stack: Vec<(&Phid, Vec<&Phid>)> = vec![(start, self.parents_of(start).collect())];

            loop {
                let Some((node, pending)) = stack.last_mut() else {
                    break;
                };
                let node = *node;
                match pending.pop() {
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                    Some(next) => match marks.get(next) {
                        Some(Mark::Done) => {}
                        Some(Mark::Expanding) => {
                            let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                            let mut path: Vec<Phid> =
                                stack[from..].iter().map(|(n, _)| (*n).clone()).collect();
                            path.push(next.clone());
                            return Err(GraphIntegrityError::Cycle { path });
                        }
                        None => {
                            marks.insert(next, Mark::Expanding);
                            stack.push((next, self.parents_of(next).collect()));
                        }
                    },
                }
            }
        }
        Ok(())
    }

    /// Fail if any node is unresolved
    pub fn require_resolved(&self) -> std::result::Result<(), GraphIntegrityError> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(GraphIntegrityError::Unresolved {
                phids: self.unresolved.iter().cloned().collect(),
            })
        }
    }

    /// Apply an unresolved-revision policy
    pub fn apply_policy(&self, policy: UnresolvedPolicy) -> std::result::Result<(), GraphIntegrityError> {
        match policy {
            UnresolvedPolicy::Fail => self.require_resolved(),
            UnresolvedPolicy::Partial => {
                if !self.unresolved.is_empty() {
                    warn!(count = self.unresolved.len(), "continuing with unresolved revisions");
                }
                Ok(())
            }
        }
    }
}

/// Build the stack graph containing `root`
///
/// Expands level by level: every revision discovered at one level is
/// queried in a single batched edge search, so independent branches are
/// expanded together. All nodes are then resolved in one batch; revisions
/// the service does not return are kept and marked unresolved. Cycles abort
/// with [`GraphIntegrityError::Cycle`].
pub async fn build_stack_graph(service: &dyn ReviewService, root: &Phid) -> Result<StackGraph> {
    let mut nodes = BTreeSet::from([root.clone()]);
    let mut edges = BTreeSet::new();
    let mut frontier = vec![root.clone()];

    while !frontier.is_empty() {
        debug!(frontier = frontier.len(), known = nodes.len(), "expanding stack");
        let found = service.search_edges(&frontier).await?;

        let mut next = BTreeSet::new();
        for edge in found {
            let (dependent, dependency) = edge.as_dependency();
            for phid in [&dependent, &dependency] {
                if !nodes.contains(phid) {
                    next.insert(phid.clone());
                }
            }
            edges.insert((dependent, dependency));
        }

        nodes.extend(next.iter().cloned());
        if nodes.len() > MAX_STACK_SIZE {
            return Err(GraphIntegrityError::TooLarge {
                limit: MAX_STACK_SIZE,
            }
            .into());
        }
        frontier = next.into_iter().collect();
    }

    let all: Vec<Phid> = nodes.iter().cloned().collect();
    let revisions: BTreeMap<Phid, Revision> = service
        .search_revisions_by_phid(&all)
        .await?
        .into_iter()
        .map(|r| (r.phid.clone(), r))
        .collect();

    let graph = StackGraph::from_parts(nodes, edges, revisions)?;
    if !graph.unresolved.is_empty() {
        warn!(unresolved = ?graph.unresolved, "stack references unresolvable revisions");
    }
    graph.check_acyclic()?;

    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "built stack graph"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phid(n: u64) -> Phid {
        Phid::from(format!("PHID-DREV-{n}"))
    }

    fn graph(nodes: &[u64], edges: &[(u64, u64)]) -> StackGraph {
        StackGraph::from_parts(
            nodes.iter().map(|n| phid(*n)).collect(),
            edges.iter().map(|(a, b)| (phid(*a), phid(*b))).collect(),
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let err = StackGraph::from_parts(
            BTreeSet::from([phid(1)]),
            BTreeSet::from([(phid(1), phid(2))]),
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, GraphIntegrityError::DanglingEdge(phid(2)));
    }

    #[test]
    fn test_acyclic_diamond() {
        let g = graph(&[1, 2, 3, 4], &[(2, 1), (3, 1), (4, 2), (4, 3)]);
        assert!(g.check_acyclic().is_ok());
        assert_eq!(g.roots(), BTreeSet::from([&phid(1)]));
        assert_eq!(g.heads(), BTreeSet::from([&phid(4)]));
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(&[1, 2], &[(1, 2), (2, 1)]);
        match g.check_acyclic() {
            Err(GraphIntegrityError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_long_cycle_behind_tail() {
        let g = graph(&[1, 2, 3, 4, 5], &[(5, 4), (4, 3), (3, 2), (2, 4), (2, 1)]);
        let Err(GraphIntegrityError::Cycle { path }) = g.check_acyclic() else {
            panic!("expected cycle");
        };
        let members: BTreeSet<_> = path.iter().cloned().collect();
        assert_eq!(members, BTreeSet::from([phid(2), phid(3), phid(4)]));
    }

    #[test]
    fn test_deep_linear_stack_does_not_overflow() {
        let n = 2000u64;
        let nodes: Vec<u64> = (1..=n).collect();
        let edges: Vec<(u64, u64)> = (2..=n).map(|i| (i, i - 1)).collect();
        assert!(graph(&nodes, &edges).check_acyclic().is_ok());
    }

    #[test]
    fn test_dependencies_closure() {
        let g = graph(&[1, 2, 3, 4], &[(2, 1), (3, 2), (4, 1)]);
        assert_eq!(
            g.dependencies_closure(&phid(3)),
            BTreeSet::from([phid(1), phid(2), phid(3)])
        );
    }

    #[test]
    fn test_unresolved_policy() {
        let g = graph(&[1], &[]);
        assert!(g.apply_policy(UnresolvedPolicy::Fail).is_err());
        assert!(g.apply_policy(UnresolvedPolicy::Partial).is_ok());
    }
}
