//! Core types shared by every layer of phab-uplift

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric revision identifier (the `123` in `D123`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = crate::error::Error;

    /// Accepts `123` or `D123`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('D').unwrap_or(trimmed);
        match digits.parse::<u64>() {
            Ok(0) | Err(_) => Err(crate::error::Error::Validation(format!(
                "revision id must be a positive integer or D<number>, got '{s}'"
            ))),
            Ok(n) => Ok(Self(n)),
        }
    }
}

/// Numeric diff identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffId(pub u64);

impl fmt::Display for DiffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque Phabricator object identifier (`PHID-DREV-...`, `PHID-DIFF-...`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phid(String);

impl Phid {
    /// Borrow the raw PHID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Phid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Phid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Review state of a revision on the review service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisionStatus {
    /// Waiting for reviewers
    NeedsReview,
    /// Reviewers requested changes
    NeedsRevision,
    /// Accepted, not landed yet
    Accepted,
    /// Landed
    Published,
    /// Abandoned by its author
    Abandoned,
    /// Author plans further changes
    ChangesPlanned,
    /// Not yet submitted for review
    Draft,
}

impl RevisionStatus {
    /// Revision can no longer be landed anywhere
    pub const fn is_abandoned(self) -> bool {
        matches!(self, Self::Abandoned)
    }
}

/// A revision as seen on the review service (read-only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Numeric id
    pub id: RevisionId,
    /// Object PHID
    pub phid: Phid,
    /// Revision title
    pub title: String,
    /// Review status
    pub status: RevisionStatus,
    /// Repository the revision belongs to, if any
    pub repository_phid: Option<Phid>,
    /// PHID of the current diff
    pub diff_phid: Phid,
    /// Linked bug, if any
    pub bug_id: Option<u64>,
}

/// Metadata of a diff attached to a revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDescriptor {
    /// Numeric id, used to fetch raw content
    pub id: DiffId,
    /// Object PHID
    pub phid: Phid,
    /// Owning revision
    pub revision_phid: Option<Phid>,
    /// Repository the diff was created against
    pub repository_phid: Option<Phid>,
    /// Base commit the diff applies on, if reported
    pub base_revision: Option<String>,
}

/// A repository as seen on the review service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// Object PHID
    pub phid: Phid,
    /// Short name (callsign-free identifier, e.g. `mozilla-beta`)
    pub short_name: String,
    /// Display name
    pub name: String,
}

/// Identity of a revision created or edited on the review service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRef {
    /// Numeric id
    pub id: RevisionId,
    /// Object PHID
    pub phid: Phid,
}

/// Authenticated requester, resolved before any uplift work starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Review service username
    pub username: String,
    /// Primary email; recorded on every uplift request
    pub email: String,
}

/// One edit applied to a revision via `differential.revision.edit`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Transaction type (`update`, `title`, `summary`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Transaction value
    pub value: serde_json::Value,
}

impl Transaction {
    /// Build a transaction from anything serializable
    pub fn new(kind: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}

/// Risk level declared by the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpliftRisk {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl fmt::Display for UpliftRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for UpliftRisk {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(crate::error::Error::Validation(format!(
                "risk must be one of low, medium, high; got '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of an uplift request
///
/// ```text
/// created -> approved -> landed
///         \           \-> failed
///          \-> rejected
///           \-> failed (replication failed before approval)
/// failed -> created (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpliftStatus {
    /// Replicated (or accepted), waiting for approval
    Created,
    /// Approved by release management
    Approved,
    /// Rejected by release management
    Rejected,
    /// Landed on the target repository
    Landed,
    /// Replication or landing failed
    Failed,
}

impl UpliftStatus {
    /// Whether `self -> next` is an allowed transition
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Approved | Self::Rejected | Self::Failed)
                | (Self::Approved, Self::Landed | Self::Failed)
                | (Self::Failed, Self::Created)
        )
    }

    /// No further transitions except an explicit retry of `failed`
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Landed | Self::Failed)
    }
}

impl fmt::Display for UpliftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Landed => write!(f, "landed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for UpliftStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "landed" => Ok(Self::Landed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::error::Error::Validation(format!(
                "unknown uplift status '{other}'"
            ))),
        }
    }
}
