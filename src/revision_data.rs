//! Batched loading of revisions and their current diffs

use crate::error::{Error, Result};
use crate::platform::ReviewService;
use crate::types::{DiffDescriptor, Phid, Revision};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How missing revisions or diffs are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Any missing revision or diff fails the whole fetch
    #[default]
    Strict,
    /// Missing entries are reported in [`ExtendedRevisionData::missing`]
    Partial,
}

/// Snapshot of revisions and their current diffs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedRevisionData {
    /// Revisions keyed by revision PHID
    pub revisions: BTreeMap<Phid, Revision>,
    /// Diffs keyed by diff PHID
    pub diffs: BTreeMap<Phid, DiffDescriptor>,
    /// Requested revisions that were not found, or whose diff was not found
    pub missing: BTreeSet<Phid>,
}

impl ExtendedRevisionData {
    /// Current diff of `revision`
    pub fn diff_for(&self, revision: &Phid) -> Option<&DiffDescriptor> {
        self.revisions
            .get(revision)
            .and_then(|r| self.diffs.get(&r.diff_phid))
    }
}

/// Load `phids` and their current diffs in two batched calls
pub async fn request_extended_revision_data(
    service: &dyn ReviewService,
    phids: &[Phid],
    mode: FetchMode,
) -> Result<ExtendedRevisionData> {
    let mut data = ExtendedRevisionData::default();
    if phids.is_empty() {
        return Ok(data);
    }

    let wanted: BTreeSet<&Phid> = phids.iter().collect();
    data.revisions = service
        .search_revisions_by_phid(phids)
        .await?
        .into_iter()
        .filter(|r| wanted.contains(&r.phid))
        .map(|r| (r.phid.clone(), r))
        .collect();

    let diff_phids: Vec<Phid> = data
        .revisions
        .values()
        .map(|r| r.diff_phid.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    data.diffs = service
        .search_diffs(&diff_phids)
        .await?
        .into_iter()
        .map(|d| (d.phid.clone(), d))
        .collect();

    data.missing = wanted
        .into_iter()
        .filter(|p| data.diff_for(p).is_none())
        .cloned()
        .collect();

    debug!(
        revisions = data.revisions.len(),
        diffs = data.diffs.len(),
        missing = data.missing.len(),
        "fetched extended revision data"
    );

    if !data.missing.is_empty() {
        match mode {
            FetchMode::Strict => {
                let missing: Vec<String> = data.missing.iter().map(ToString::to_string).collect();
                return Err(Error::RemoteLookupFailed(format!(
                    "revision data not found for {}",
                    missing.join(", ")
                )));
            }
            FetchMode::Partial => {
                warn!(missing = ?data.missing, "continuing with partial revision data");
            }
        }
    }

    Ok(data)
}
