//! Phabricator API token discovery and identity guard

use crate::auth::AuthSource;
use crate::error::{Error, Result};
use crate::platform::ReviewService;
use crate::types::Requester;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use tracing::debug;

/// Phabricator authentication configuration
#[derive(Debug, Clone)]
pub struct PhabricatorAuthConfig {
    /// Conduit API token
    pub token: String,
    /// Where the token was obtained from
    pub source: AuthSource,
    /// Review service URL the token belongs to
    pub host: String,
}

#[derive(Deserialize)]
struct ArcRc {
    #[serde(default)]
    hosts: BTreeMap<String, ArcRcHost>,
}

#[derive(Deserialize)]
struct ArcRcHost {
    token: Option<String>,
}

/// Get Phabricator authentication
///
/// Priority:
/// 1. `PHABRICATOR_API_TOKEN` environment variable
/// 2. `~/.arcrc` entry for `host`
pub async fn get_phabricator_auth(host: &str) -> Result<PhabricatorAuthConfig> {
    debug!("checking PHABRICATOR_API_TOKEN env var");
    if let Ok(token) = env::var("PHABRICATOR_API_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            debug!("obtained API token from PHABRICATOR_API_TOKEN env var");
            return Ok(PhabricatorAuthConfig {
                token,
                source: AuthSource::EnvVar,
                host: host.to_string(),
            });
        }
    }

    if let Some(path) = dirs::home_dir().map(|h| h.join(".arcrc")) {
        debug!(path = %path.display(), "checking arcrc");
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Auth(format!("cannot read {}: {e}", path.display()))),
        };
        if let Some(token) = text.map(|t| read_arcrc_token(&t, host)).transpose()?.flatten() {
            debug!("obtained API token from arcrc");
            return Ok(PhabricatorAuthConfig {
                token,
                source: AuthSource::ArcRc,
                host: host.to_string(),
            });
        }
    }

    debug!("no Phabricator authentication found");
    Err(Error::Auth(
        "No Phabricator API token found. Create one under Settings > Conduit API Tokens and set PHABRICATOR_API_TOKEN".to_string(),
    ))
}

/// Extract the token for `host` from `.arcrc` JSON text
///
/// Hosts in `.arcrc` are API endpoints (`https://phab.example/api/`); the
/// lookup accepts either the web root or the API URL.
pub fn read_arcrc_token(text: &str, host: &str) -> Result<Option<String>> {
    let arcrc: ArcRc = serde_json::from_str(text)
        .map_err(|e| Error::Auth(format!("malformed arcrc: {e}")))?;
    let wanted = normalize_host(host);
    Ok(arcrc
        .hosts
        .into_iter()
        .find(|(key, _)| normalize_host(key) == wanted)
        .and_then(|(_, entry)| entry.token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}

fn normalize_host(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
}

/// Resolve the identity behind the service's token
///
/// Used as a guard before any uplift work: fails when the account has no
/// email address to record as requester.
pub async fn authenticate(service: &dyn ReviewService) -> Result<Requester> {
    let requester = service.whoami().await.map_err(|e| match e {
        Error::Conduit { info, .. } => Error::Auth(info),
        other => other,
    })?;
    if requester.email.trim().is_empty() {
        return Err(Error::Auth(format!(
            "account '{}' has no primary email",
            requester.username
        )));
    }
    debug!(username = %requester.username, "authenticated");
    Ok(requester)
}
