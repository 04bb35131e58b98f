//! Authentication for the review service
//!
//! Supports environment variables and the `arc` client's `~/.arcrc` file.
//! Identity checks live here, outside the uplift core: the orchestrator only
//! ever receives an already-resolved [`Requester`](crate::types::Requester).

mod phabricator;

pub use phabricator::{
    authenticate, get_phabricator_auth, read_arcrc_token, PhabricatorAuthConfig,
};

/// Source of authentication token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Token from environment variable
    EnvVar,
    /// Token from the `arc` configuration file
    ArcRc,
}
