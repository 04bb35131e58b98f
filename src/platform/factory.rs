//! Review service factory
//!
//! Creates the review service client from settings.

use crate::auth::get_phabricator_auth;
use crate::config::Settings;
use crate::error::Result;
use crate::platform::{ConduitService, ReviewService};
use std::time::Duration;

/// Create a review service from settings
///
/// Handles token discovery and client construction.
pub async fn create_review_service(settings: &Settings) -> Result<Box<dyn ReviewService>> {
    let url = settings.phabricator_url()?;
    let auth = get_phabricator_auth(url).await?;
    Ok(Box::new(ConduitService::new(
        url,
        auth.token,
        settings.retry_policy(),
        Duration::from_secs(settings.request_timeout_secs),
    )?))
}
