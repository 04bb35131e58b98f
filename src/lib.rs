//! phab-uplift - uplift reviewed Phabricator stacks to release repositories
//!
//! Given a revision and an approval-gated target repository, discovers the
//! revision's stack, works out which revisions can land on the target, and
//! replicates their diffs as new revisions on the target repository. Every
//! (revision, repository) pair is tracked by one uplift request with its own
//! status lifecycle.

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod landable;
pub mod platform;
pub mod repos;
pub mod request;
pub mod revision_data;
pub mod store;
pub mod types;
pub mod uplift;
pub mod validation;

pub use error::{Error, Result};
