//! Error types for phab-uplift

use crate::types::{Phid, RevisionId, UpliftStatus};
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error classes, used to decide how a failure is reported and retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape or values, never retried
    Validation,
    /// Repository not approval-gated or revision not found
    Eligibility,
    /// Cycle or unresolved dependency in a revision stack
    GraphIntegrity,
    /// Network or timeout failure against the review service
    RemoteTransient,
    /// Non-transient failure reported by the review service
    Remote,
    /// Duplicate natural key or lost compare-and-set
    Conflict,
    /// Storage write or read failure
    Persistence,
    /// Everything else
    Internal,
}

/// Structural problems found while building or analysing a stack graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIntegrityError {
    /// A dependency cycle; `path` lists the revisions on the cycle
    #[error("dependency cycle detected: {}", format_path(.path))]
    Cycle {
        /// Revisions forming the cycle, starting and ending on the same node
        path: Vec<Phid>,
    },

    /// Revisions referenced by dependency edges that the review service could not resolve
    #[error("unresolved revisions in stack: {}", format_path(.phids))]
    Unresolved {
        /// The unresolved revision PHIDs
        phids: Vec<Phid>,
    },

    /// An edge references a node outside the graph
    #[error("edge references unknown revision {0}")]
    DanglingEdge(Phid),

    /// Stack discovery exceeded the size bound
    #[error("stack exceeds {limit} revisions")]
    TooLarge {
        /// The configured bound
        limit: usize,
    },
}

fn format_path(phids: &[Phid]) -> String {
    phids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors that can occur in phab-uplift
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input payload
    #[error("invalid request: {0}")]
    Validation(String),

    /// Target repository is unknown or not approval-gated
    #[error("repository '{repository}' is not eligible for uplift: {reason}")]
    RepositoryNotEligible {
        /// Repository short name
        repository: String,
        /// Why it was rejected
        reason: String,
    },

    /// Source revision does not exist on the review service
    #[error("revision {0} not found")]
    RevisionNotFound(RevisionId),

    /// No uplift request with this id
    #[error("uplift request {0} not found")]
    RequestNotFound(u64),

    /// A lookup against the review service returned nothing usable
    #[error("review service lookup failed: {0}")]
    RemoteLookupFailed(String),

    /// Stack graph could not be built or is inconsistent
    #[error("stack graph error: {0}")]
    GraphIntegrity(#[from] GraphIntegrityError),

    /// No revision of the stack can be uplifted
    #[error("nothing landable for {revision}: {reason}")]
    NothingLandable {
        /// Source revision
        revision: RevisionId,
        /// Why the source revision is blocked
        reason: String,
    },

    /// Network, timeout or server-side failure; safe to retry
    #[error("review service unavailable: {0}")]
    RemoteTransient(String),

    /// Error response from the Conduit API
    #[error("conduit error {code}: {info}")]
    Conduit {
        /// Conduit `error_code`
        code: String,
        /// Conduit `error_info`
        info: String,
    },

    /// An uplift request already exists for the natural key
    #[error("uplift request for {revision_id} on '{repository}' already exists")]
    Conflict {
        /// Revision of the natural key
        revision_id: RevisionId,
        /// Repository of the natural key
        repository: String,
    },

    /// Status change not allowed by the state machine
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: UpliftStatus,
        /// Requested status
        to: UpliftStatus,
    },

    /// Storage failure
    #[error("storage error: {0}")]
    Persistence(String),

    /// Authentication error
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Parse error
    #[error("parse error: {0}")]
    Parse(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify the error for reporting and retry decisions
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Parse(_) => ErrorKind::Validation,
            Self::RepositoryNotEligible { .. }
            | Self::RevisionNotFound(_)
            | Self::RequestNotFound(_)
            | Self::NothingLandable { .. } => ErrorKind::Eligibility,
            Self::GraphIntegrity(_) => ErrorKind::GraphIntegrity,
            Self::RemoteTransient(_) => ErrorKind::RemoteTransient,
            Self::RemoteLookupFailed(_) | Self::Conduit { .. } | Self::Auth(_) => {
                ErrorKind::Remote
            }
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Persistence(_) | Self::Io(_) => ErrorKind::Persistence,
            Self::InvalidTransition { .. }
            | Self::Config(_)
            | Self::Internal(_)
            | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call may succeed
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteTransient(_))
    }

    /// Whether the error is a natural-key conflict
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err.is_request()
            || err.status().is_some_and(|s| {
                s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
            });
        if transient {
            Self::RemoteTransient(err.to_string())
        } else if err.is_decode() {
            Self::RemoteLookupFailed(format!("unexpected response: {err}"))
        } else {
            Self::RemoteLookupFailed(err.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_taxonomy() {
        assert_eq!(
            Error::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::RevisionNotFound(RevisionId(1)).kind(),
            ErrorKind::Eligibility
        );
        assert_eq!(
            Error::GraphIntegrity(GraphIntegrityError::TooLarge { limit: 1 }).kind(),
            ErrorKind::GraphIntegrity
        );
        assert_eq!(
            Error::Conflict {
                revision_id: RevisionId(1),
                repository: "mozilla-beta".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            Error::Persistence("disk".into()).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_only_remote_transient_is_transient() {
        assert!(Error::RemoteTransient("timeout".into()).is_transient());
        assert!(
            !Error::Conduit {
                code: "ERR-INVALID-AUTH".into(),
                info: "bad token".into()
            }
            .is_transient()
        );
        assert!(!Error::RevisionNotFound(RevisionId(3)).is_transient());
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = GraphIntegrityError::Cycle {
            path: vec![
                Phid::from("PHID-DREV-1"),
                Phid::from("PHID-DREV-2"),
                Phid::from("PHID-DREV-1"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: PHID-DREV-1 -> PHID-DREV-2 -> PHID-DREV-1"
        );
    }
}
