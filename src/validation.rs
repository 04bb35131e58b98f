//! Inbound payload validation
//!
//! Turns a loosely typed request (as received from a form, JSON body or
//! command line) into a [`ValidatedUplift`] the orchestrator can trust.

use crate::error::{Error, Result};
use crate::repos::RepoConfig;
use crate::request::UpliftForm;
use crate::types::{RevisionId, UpliftRisk};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `123`, `D123`, or a revision URL ending in `/D123`
static REVISION_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://\S+/)?[Dd]?(\d+)/?$").unwrap_or_else(|_| unreachable!())
});

/// Revision reference as submitted: a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RevisionInput {
    /// Bare number, possibly negative
    Number(i64),
    /// `123`, `D123` or a revision URL
    Text(String),
}

impl Default for RevisionInput {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl From<&str> for RevisionInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Unvalidated uplift request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpliftPayload {
    /// Source revision
    pub revision_id: RevisionInput,
    /// Target repository short names
    pub repositories: Vec<String>,
    /// Declared risk, one of `low`, `medium`, `high`
    pub risk: String,
    /// Who is affected and how
    pub user_impact: String,
    /// How to reproduce
    pub steps_to_reproduce: String,
    /// Risk justification
    pub risky: String,
    /// Localized string changes
    pub string_changes: String,
    /// Covered by automated tests
    pub automated_tests: bool,
    /// Verified on nightly
    pub nightly: bool,
    /// Bugs fixed
    pub bug_ids: Vec<i64>,
}

/// A payload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUplift {
    /// Source revision
    pub revision_id: RevisionId,
    /// Approval-gated target repositories, deduplicated, in submitted order
    pub repositories: Vec<String>,
    /// Normalized form answers
    pub form: UpliftForm,
}

/// Parse a revision reference
pub fn parse_revision(input: &RevisionInput) -> Result<RevisionId> {
    let invalid = || {
        Error::Validation(format!(
            "revision id must be a positive integer or D<number>, got '{}'",
            match input {
                RevisionInput::Number(n) => n.to_string(),
                RevisionInput::Text(s) => s.clone(),
            }
        ))
    };
    match input {
        RevisionInput::Number(n) => match u64::try_from(*n) {
            Ok(n) if n > 0 => Ok(RevisionId(n)),
            _ => Err(invalid()),
        },
        RevisionInput::Text(s) => {
            let caps = REVISION_REF.captures(s.trim()).ok_or_else(invalid)?;
            match caps[1].parse::<u64>() {
                Ok(n) if n > 0 => Ok(RevisionId(n)),
                _ => Err(invalid()),
            }
        }
    }
}

fn validate_repositories(names: &[String], repos: &RepoConfig) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for name in names {
        let name = name.trim();
        if repos.uplift_target(name).is_err() {
            return Err(Error::Validation(format!("No valid uplift repository: '{name}'")));
        }
        if seen.insert(name) {
            out.push(name.to_string());
        }
    }
    if out.is_empty() {
        return Err(Error::Validation("No valid uplift repository".to_string()));
    }
    Ok(out)
}

fn validate_bug_ids(ids: &[i64]) -> Result<Vec<u64>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for id in ids {
        let bug = u64::try_from(*id)
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| Error::Validation(format!("bug id must be positive, got {id}")))?;
        if seen.insert(bug) {
            out.push(bug);
        }
    }
    Ok(out)
}

/// Validate `payload` against the repositories of the current environment
pub fn validate_payload(payload: &UpliftPayload, repos: &RepoConfig) -> Result<ValidatedUplift> {
    let revision_id = parse_revision(&payload.revision_id)?;
    let repositories = validate_repositories(&payload.repositories, repos)?;
    let risk: UpliftRisk = payload.risk.parse()?;
    let user_impact = payload.user_impact.trim();
    if user_impact.is_empty() {
        return Err(Error::Validation("user impact is required".to_string()));
    }

    Ok(ValidatedUplift {
        revision_id,
        repositories,
        form: UpliftForm {
            user_impact: user_impact.to_string(),
            steps_to_reproduce: payload.steps_to_reproduce.trim().to_string(),
            risky: payload.risky.trim().to_string(),
            string_changes: payload.string_changes.trim().to_string(),
            automated_tests: payload.automated_tests,
            nightly: payload.nightly,
            bug_ids: validate_bug_ids(&payload.bug_ids)?,
            risk,
        },
    })
}
