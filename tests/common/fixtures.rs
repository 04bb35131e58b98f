//! Shared fixtures: repositories, form answers and stack setups

use super::mock_review::MockReviewService;
use phab_uplift::repos::{Repo, RepoConfig};
use phab_uplift::request::UpliftForm;
use phab_uplift::types::{Requester, RevisionStatus, UpliftRisk};

pub const CENTRAL_PHID: &str = "PHID-REPO-central";
pub const BETA_PHID: &str = "PHID-REPO-beta";
pub const RELEASE_PHID: &str = "PHID-REPO-release";
pub const OTHER_PHID: &str = "PHID-REPO-other";

/// mozilla-central (not approval-gated) plus two release repositories
pub fn repos() -> RepoConfig {
    RepoConfig::from_repos(
        "test",
        [
            Repo::new("mozilla-central", false),
            Repo::new("mozilla-beta", true),
            Repo::new("mozilla-release", true),
        ],
    )
}

pub fn form() -> UpliftForm {
    UpliftForm {
        user_impact: "Crash on startup for some users".into(),
        steps_to_reproduce: "Open the browser".into(),
        risky: "Small patch".into(),
        string_changes: String::new(),
        automated_tests: true,
        nightly: true,
        bug_ids: vec![1_234_567],
        risk: UpliftRisk::Low,
    }
}

pub fn requester() -> Requester {
    Requester {
        username: "dev".into(),
        email: "dev@example.com".into(),
    }
}

/// Review service knowing the three repositories
pub fn service() -> MockReviewService {
    let service = MockReviewService::new();
    service.add_repository("mozilla-central", CENTRAL_PHID);
    service.add_repository("mozilla-beta", BETA_PHID);
    service.add_repository("mozilla-release", RELEASE_PHID);
    service
}

/// Linear stack on mozilla-central: each id depends on the previous one
pub fn linear_stack(service: &MockReviewService, ids: &[u64]) {
    for id in ids {
        service.add_revision(*id, CENTRAL_PHID, RevisionStatus::Accepted);
    }
    for pair in ids.windows(2) {
        service.add_dependency(pair[1], pair[0]);
    }
}

/// Dependencies of the eleven-revision multi-root stack, by index
pub const MULTI_ROOT_DEPS: [&[u64]; 11] = [
    &[],
    &[],
    &[1],
    &[0, 2],
    &[3],
    &[3],
    &[5],
    &[4],
    &[6, 7],
    &[8],
    &[8],
];

/// Revision id of multi-root stack member `index`
pub const fn multi_root_id(index: u64) -> u64 {
    index + 1
}

/// The multi-root stack on mozilla-central
pub fn multi_root_stack(service: &MockReviewService) {
    for (index, deps) in MULTI_ROOT_DEPS.iter().enumerate() {
        let id = multi_root_id(index as u64);
        service.add_revision(id, CENTRAL_PHID, RevisionStatus::Accepted);
        for dep in *deps {
            service.add_dependency(id, multi_root_id(*dep));
        }
    }
}
