//! In-memory review service double

use async_trait::async_trait;
use phab_uplift::error::{Error, Result};
use phab_uplift::platform::{EdgeKind, ReviewService, RevisionEdge};
use phab_uplift::types::{
    DiffDescriptor, DiffId, Phid, RepositoryDescriptor, Requester, Revision, RevisionId,
    RevisionRef, RevisionStatus, Transaction,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Id offset of revisions created through `edit_revision`
pub const CREATED_REVISION_BASE: u64 = 10_000;

/// A diff uploaded through `create_raw_diff`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDiff {
    pub phid: Phid,
    pub repository: Phid,
    pub raw: String,
}

/// One `edit_revision` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEdit {
    pub object: Option<Phid>,
    pub result: RevisionRef,
    pub transactions: Vec<Transaction>,
}

impl RecordedEdit {
    /// Value of the first transaction of `kind`
    pub fn value(&self, kind: &str) -> Option<&serde_json::Value> {
        self.transactions
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| &t.value)
    }
}

#[derive(Default)]
struct MockState {
    repositories: Vec<RepositoryDescriptor>,
    revisions: BTreeMap<Phid, Revision>,
    hidden: BTreeSet<Phid>,
    edges: BTreeSet<(Phid, Phid)>,
    diffs: BTreeMap<Phid, DiffDescriptor>,
    raw_diffs: BTreeMap<DiffId, String>,
    failing_diffs: BTreeSet<DiffId>,
    created_diffs: Vec<CreatedDiff>,
    edits: Vec<RecordedEdit>,
    calls: Vec<String>,
}

/// Review service backed by in-memory tables
///
/// Records every call by method name, and records uploaded diffs and
/// revision edits so tests can inspect remote side effects.
#[derive(Default)]
pub struct MockReviewService {
    state: Mutex<MockState>,
}

pub fn revision_phid(id: u64) -> Phid {
    Phid::from(format!("PHID-DREV-{id}"))
}

pub fn diff_phid(id: u64) -> Phid {
    Phid::from(format!("PHID-DIFF-{id}"))
}

/// Raw patch text used for revision `id`
pub fn raw_diff(id: u64) -> String {
    format!(
        "diff --git a/file{id}.txt b/file{id}.txt\n\
         --- a/file{id}.txt\n\
         +++ b/file{id}.txt\n\
         @@ -1,1 +1,2 @@\n \
         line\n\
         +change for D{id}\twith tab and trailing space \n"
    )
}

impl MockReviewService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, method: &str) {
        self.state().calls.push(method.to_string());
    }

    pub fn add_repository(&self, short_name: &str, phid: &str) {
        self.state().repositories.push(RepositoryDescriptor {
            phid: Phid::from(phid),
            short_name: short_name.to_string(),
            name: short_name.to_string(),
        });
    }

    /// Add revision `D<id>` on `repository` with a current diff
    pub fn add_revision(&self, id: u64, repository: &str, status: RevisionStatus) {
        let phid = revision_phid(id);
        let diff = DiffDescriptor {
            id: DiffId(id),
            phid: diff_phid(id),
            revision_phid: Some(phid.clone()),
            repository_phid: Some(Phid::from(repository)),
            base_revision: Some(format!("{id:040x}")),
        };
        let mut state = self.state();
        state.revisions.insert(
            phid.clone(),
            Revision {
                id: RevisionId(id),
                phid,
                title: format!("Bug {} - change {id}", 1_000_000 + id),
                status,
                repository_phid: Some(Phid::from(repository)),
                diff_phid: diff.phid.clone(),
                bug_id: Some(1_000_000 + id),
            },
        );
        state.raw_diffs.insert(diff.id, raw_diff(id));
        state.diffs.insert(diff.phid.clone(), diff);
    }

    /// `dependent` cannot land before `dependency`
    pub fn add_dependency(&self, dependent: u64, dependency: u64) {
        self.state()
            .edges
            .insert((revision_phid(dependent), revision_phid(dependency)));
    }

    /// Revision lookups stop returning `D<id>`; its edges stay visible
    pub fn hide_revision(&self, id: u64) {
        self.state().hidden.insert(revision_phid(id));
    }

    /// Fetching the raw diff of `D<id>` fails with a non-transient error
    pub fn fail_raw_diff(&self, id: u64) {
        self.state().failing_diffs.insert(DiffId(id));
    }

    /// Undo [`Self::fail_raw_diff`]
    pub fn restore_raw_diff(&self, id: u64) {
        self.state().failing_diffs.remove(&DiffId(id));
    }

    /// Number of calls to `method`
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == method).count()
    }

    pub fn created_diffs(&self) -> Vec<CreatedDiff> {
        self.state().created_diffs.clone()
    }

    pub fn edits(&self) -> Vec<RecordedEdit> {
        self.state().edits.clone()
    }
}

#[async_trait]
impl ReviewService for MockReviewService {
    async fn search_repository(&self, short_name: &str) -> Result<Option<RepositoryDescriptor>> {
        self.record("search_repository");
        Ok(self
            .state()
            .repositories
            .iter()
            .find(|r| r.short_name == short_name)
            .cloned())
    }

    async fn search_revisions_by_id(&self, ids: &[RevisionId]) -> Result<Vec<Revision>> {
        self.record("search_revisions_by_id");
        let state = self.state();
        Ok(state
            .revisions
            .values()
            .filter(|r| ids.contains(&r.id) && !state.hidden.contains(&r.phid))
            .cloned()
            .collect())
    }

    async fn search_revisions_by_phid(&self, phids: &[Phid]) -> Result<Vec<Revision>> {
        self.record("search_revisions_by_phid");
        let state = self.state();
        Ok(phids
            .iter()
            .filter(|p| !state.hidden.contains(*p))
            .filter_map(|p| state.revisions.get(p))
            .cloned()
            .collect())
    }

    async fn search_edges(&self, phids: &[Phid]) -> Result<Vec<RevisionEdge>> {
        self.record("search_edges");
        let state = self.state();
        let mut found = Vec::new();
        for phid in phids {
            for (dependent, dependency) in &state.edges {
                if dependent == phid {
                    found.push(RevisionEdge {
                        source: phid.clone(),
                        destination: dependency.clone(),
                        kind: EdgeKind::Parent,
                    });
                }
                if dependency == phid {
                    found.push(RevisionEdge {
                        source: phid.clone(),
                        destination: dependent.clone(),
                        kind: EdgeKind::Child,
                    });
                }
            }
        }
        Ok(found)
    }

    async fn search_diffs(&self, phids: &[Phid]) -> Result<Vec<DiffDescriptor>> {
        self.record("search_diffs");
        let state = self.state();
        Ok(phids
            .iter()
            .filter_map(|p| state.diffs.get(p))
            .cloned()
            .collect())
    }

    async fn get_raw_diff(&self, diff_id: DiffId) -> Result<String> {
        self.record("get_raw_diff");
        let state = self.state();
        if state.failing_diffs.contains(&diff_id) {
            return Err(Error::Conduit {
                code: "ERR-CONDUIT-CORE".into(),
                info: format!("diff {diff_id} is not available"),
            });
        }
        state
            .raw_diffs
            .get(&diff_id)
            .cloned()
            .ok_or_else(|| Error::RemoteLookupFailed(format!("diff {diff_id} not found")))
    }

    async fn create_raw_diff(&self, diff: &str, repository: &Phid) -> Result<Phid> {
        self.record("create_raw_diff");
        let mut state = self.state();
        let n = 90_000 + state.created_diffs.len() as u64;
        let phid = Phid::from(format!("PHID-DIFF-uplift-{n}"));
        state.raw_diffs.insert(DiffId(n), diff.to_string());
        state.diffs.insert(
            phid.clone(),
            DiffDescriptor {
                id: DiffId(n),
                phid: phid.clone(),
                revision_phid: None,
                repository_phid: Some(repository.clone()),
                base_revision: None,
            },
        );
        state.created_diffs.push(CreatedDiff {
            phid: phid.clone(),
            repository: repository.clone(),
            raw: diff.to_string(),
        });
        Ok(phid)
    }

    async fn edit_revision(
        &self,
        object: Option<&Phid>,
        transactions: &[Transaction],
    ) -> Result<RevisionRef> {
        self.record("edit_revision");
        let mut state = self.state();
        let result = match object {
            Some(phid) => state
                .edits
                .iter()
                .find(|e| &e.result.phid == phid)
                .map(|e| e.result.clone())
                .ok_or_else(|| Error::Conduit {
                    code: "ERR-CONDUIT-CORE".into(),
                    info: format!("unknown object {phid}"),
                })?,
            None => {
                let created = state.edits.iter().filter(|e| e.object.is_none()).count() as u64;
                let id = CREATED_REVISION_BASE + created + 1;
                RevisionRef {
                    id: RevisionId(id),
                    phid: Phid::from(format!("PHID-DREV-uplift-{id}")),
                }
            }
        };
        state.edits.push(RecordedEdit {
            object: object.cloned(),
            result: result.clone(),
            transactions: transactions.to_vec(),
        });
        Ok(result)
    }

    async fn whoami(&self) -> Result<Requester> {
        self.record("whoami");
        Ok(Requester {
            username: "dev".into(),
            email: "dev@example.com".into(),
        })
    }

    fn revision_url(&self, id: RevisionId) -> String {
        format!("https://phabricator.test/{id}")
    }
}
