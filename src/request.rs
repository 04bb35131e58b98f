//! Uplift request record and its status lifecycle

use crate::error::{Error, Result};
use crate::types::{Phid, Revision, RevisionId, RevisionRef, UpliftRisk, UpliftStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Questions answered by the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpliftForm {
    /// Who is affected and how, without the patch
    pub user_impact: String,
    /// How to reproduce the problem
    #[serde(default)]
    pub steps_to_reproduce: String,
    /// Why the change is or is not risky
    #[serde(default)]
    pub risky: String,
    /// Localized string changes, if any
    #[serde(default)]
    pub string_changes: String,
    /// Change is covered by automated tests
    #[serde(default)]
    pub automated_tests: bool,
    /// Change was verified on nightly
    #[serde(default)]
    pub nightly: bool,
    /// Bugs fixed, in the order given
    #[serde(default)]
    pub bug_ids: Vec<u64>,
    /// Declared risk level
    pub risk: UpliftRisk,
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn or_none(value: &str) -> &str {
    if value.trim().is_empty() { "N/A" } else { value }
}

impl UpliftForm {
    /// Summary for the target-side revision
    pub fn render_summary(&self, source: &Revision) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Uplift of {} ({})", source.id, source.title);
        let _ = writeln!(out);
        let _ = writeln!(out, "= Uplift request details =");
        let _ = writeln!(out);
        let _ = writeln!(out, "| **Risk** | {} |", self.risk);
        let _ = writeln!(out, "| **User impact** | {} |", or_none(&self.user_impact));
        let _ = writeln!(out, "| **Steps to reproduce** | {} |", or_none(&self.steps_to_reproduce));
        let _ = writeln!(out, "| **Why is the change risky/not risky?** | {} |", or_none(&self.risky));
        let _ = writeln!(out, "| **String changes** | {} |", or_none(&self.string_changes));
        let _ = writeln!(out, "| **Automated tests** | {} |", yes_no(self.automated_tests));
        let _ = writeln!(out, "| **Verified on nightly** | {} |", yes_no(self.nightly));
        if !self.bug_ids.is_empty() {
            let bugs: Vec<String> = self.bug_ids.iter().map(|b| format!("Bug {b}")).collect();
            let _ = writeln!(out, "| **Bugs** | {} |", bugs.join(", "));
        }
        out
    }
}

/// Where a revision was replicated on the target repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationTarget {
    /// Target-side revision
    pub revision: RevisionRef,
    /// Diff uploaded to the target repository
    pub diff_phid: Phid,
}

/// Data needed to create an uplift request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpliftRequest {
    /// Source revision
    pub revision_id: RevisionId,
    /// Target repository short name
    pub repository: String,
    /// Form answers
    pub form: UpliftForm,
    /// Requester identity, fixed at creation
    pub requester_email: String,
}

impl NewUpliftRequest {
    /// Materialize the record with an assigned id; status starts at `created`
    pub fn into_request(self, id: u64, now: DateTime<Utc>) -> UpliftRequest {
        UpliftRequest {
            id,
            revision_id: self.revision_id,
            repository: self.repository,
            form: self.form,
            requester_email: self.requester_email,
            status: UpliftStatus::Created,
            target_revision_id: None,
            target_revision_phid: None,
            target_diff_phid: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One uplift attempt for a (revision, repository) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpliftRequest {
    /// Store-assigned id
    pub id: u64,
    /// Source revision (natural key, part 1)
    pub revision_id: RevisionId,
    /// Target repository short name (natural key, part 2)
    pub repository: String,
    /// Form answers
    #[serde(flatten)]
    pub form: UpliftForm,
    /// Requester identity
    pub requester_email: String,
    /// Lifecycle status
    pub status: UpliftStatus,
    /// Revision created on the target repository
    pub target_revision_id: Option<RevisionId>,
    /// PHID of the target-side revision
    pub target_revision_phid: Option<Phid>,
    /// Diff uploaded to the target repository
    pub target_diff_phid: Option<Phid>,
    /// Message of the last failure
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl UpliftRequest {
    /// The unique (revision, repository) pair
    pub fn natural_key(&self) -> (RevisionId, &str) {
        (self.revision_id, &self.repository)
    }

    /// Move to `next` if the lifecycle allows it
    pub fn transition(&mut self, next: UpliftStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next != UpliftStatus::Failed {
            self.last_error = None;
        }
        self.touch();
        Ok(())
    }

    /// Remember where the revision was replicated
    pub fn record_replication(&mut self, target: &ReplicationTarget) {
        self.target_revision_id = Some(target.revision.id);
        self.target_revision_phid = Some(target.revision.phid.clone());
        self.target_diff_phid = Some(target.diff_phid.clone());
        self.touch();
    }

    /// Mark as failed with `message`
    pub fn record_failure(&mut self, message: &str) -> Result<()> {
        self.transition(UpliftStatus::Failed)?;
        self.last_error = Some(message.to_string());
        Ok(())
    }

    fn touch(&mut self) {
        // Never move backwards, even with a coarse clock
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
