//! Repository configuration per deployment environment
//!
//! Each environment maps repository short names (as known to the review
//! service) to a [`Repo`]. Only repositories with `approval_required` can be
//! the target of an uplift.

use crate::error::{Error, Result};
use crate::types::Phid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Environment used when the requested one is unknown
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Configuration of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// Short name on the review service
    #[serde(default)]
    pub short_name: String,
    /// Tree name used by the landing infrastructure; defaults to the short name
    #[serde(default)]
    pub tree: String,
    /// Landing requires release-management approval
    #[serde(default)]
    pub approval_required: bool,
    /// Repository PHID, when known ahead of time
    #[serde(default)]
    pub phid: Option<Phid>,
}

impl Repo {
    /// Repository whose tree name equals its short name
    pub fn new(short_name: &str, approval_required: bool) -> Self {
        Self {
            short_name: short_name.to_string(),
            tree: short_name.to_string(),
            approval_required,
            phid: None,
        }
    }
}

/// Repositories available in one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    environment: String,
    repos: BTreeMap<String, Repo>,
}

fn builtin_repos(environment: &str) -> Option<Vec<Repo>> {
    let repos = match environment {
        DEFAULT_ENVIRONMENT => vec![],
        "localdev" => vec![
            Repo::new("test-repo", false),
            Repo::new("mozilla-central", false),
            Repo::new("mozilla-beta", true),
            Repo::new("mozilla-release", true),
            Repo::new("mozilla-esr115", true),
        ],
        "devsvcdev" => vec![Repo::new("test-repo", false), Repo::new("mozilla-uplift", true)],
        "devsvcprod" => vec![
            Repo::new("phabricator-qa-stage", false),
            Repo::new("version-control-tools", false),
            Repo::new("build-tools", false),
            Repo::new("mozilla-central", false),
            Repo::new("mozilla-beta", true),
            Repo::new("mozilla-release", true),
        ],
        _ => return None,
    };
    Some(repos)
}

impl RepoConfig {
    /// Build the configuration for `environment`
    ///
    /// Unknown environments fall back to [`DEFAULT_ENVIRONMENT`]. Entries in
    /// `overrides` replace or extend the built-in table for the resolved
    /// environment.
    pub fn for_env(environment: &str, overrides: &BTreeMap<String, BTreeMap<String, Repo>>) -> Self {
        let has_overrides = overrides.contains_key(environment);
        let (environment, builtin) = match builtin_repos(environment) {
            Some(repos) => (environment, repos),
            None if has_overrides => (environment, vec![]),
            None => {
                warn!(environment, "repository config requested for unknown environment");
                (DEFAULT_ENVIRONMENT, vec![])
            }
        };

        let mut repos: BTreeMap<String, Repo> = builtin
            .into_iter()
            .map(|r| (r.short_name.clone(), r))
            .collect();

        if let Some(extra) = overrides.get(environment) {
            for (name, repo) in extra {
                let mut repo = repo.clone();
                repo.short_name.clone_from(name);
                if repo.tree.is_empty() {
                    repo.tree.clone_from(name);
                }
                repos.insert(name.clone(), repo);
            }
        }

        Self {
            environment: environment.to_string(),
            repos,
        }
    }

    /// Build a configuration from an explicit list (used by tests and embedders)
    pub fn from_repos(environment: &str, repos: impl IntoIterator<Item = Repo>) -> Self {
        Self {
            environment: environment.to_string(),
            repos: repos
                .into_iter()
                .map(|r| (r.short_name.clone(), r))
                .collect(),
        }
    }

    /// Resolved environment name
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Look up a repository by short name
    pub fn get(&self, short_name: &str) -> Option<&Repo> {
        self.repos.get(short_name)
    }

    /// All repositories that accept uplift requests
    pub fn approval_gated(&self) -> impl Iterator<Item = &Repo> {
        self.repos.values().filter(|r| r.approval_required)
    }

    /// Resolve a repository that may receive uplifts
    pub fn uplift_target(&self, short_name: &str) -> Result<&Repo> {
        let repo = self.get(short_name).ok_or_else(|| Error::RepositoryNotEligible {
            repository: short_name.to_string(),
            reason: format!("unknown in environment '{}'", self.environment),
        })?;
        if !repo.approval_required {
            return Err(Error::RepositoryNotEligible {
                repository: short_name.to_string(),
                reason: "repository does not require approval".to_string(),
            });
        }
        Ok(repo)
    }
}
