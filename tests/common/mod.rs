//! Common test utilities for phab-uplift tests

pub mod fixtures;
pub mod mock_review;

// Re-exports for convenience - not all test binaries use all exports
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_review::{MockReviewService, RecordedEdit, diff_phid, raw_diff, revision_phid};
