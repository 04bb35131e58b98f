//! Conduit (Phabricator JSON-RPC) implementation of [`ReviewService`]

use crate::error::{Error, Result};
use crate::platform::{EdgeKind, RetryPolicy, ReviewService, RevisionEdge};
use crate::types::{
    DiffDescriptor, DiffId, Phid, RepositoryDescriptor, Requester, Revision, RevisionId,
    RevisionRef, RevisionStatus, Transaction,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size for `edge.search`
const EDGE_SEARCH_LIMIT: u32 = 10_000;

/// Page size for `*.search` endpoints
const SEARCH_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
struct ConduitResponse<T> {
    result: Option<T>,
    error_code: Option<String>,
    error_info: Option<String>,
}

#[derive(Deserialize)]
struct SearchPage<T> {
    data: Vec<T>,
    #[serde(default)]
    cursor: Cursor,
}

#[derive(Deserialize, Default)]
struct Cursor {
    after: Option<Value>,
}

#[derive(Deserialize)]
struct RepositoryItem {
    phid: String,
    fields: RepositoryFields,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryFields {
    name: String,
    short_name: Option<String>,
}

#[derive(Deserialize)]
struct RevisionItem {
    id: u64,
    phid: String,
    fields: RevisionFields,
}

#[derive(Deserialize)]
struct RevisionFields {
    title: String,
    status: StatusField,
    #[serde(rename = "repositoryPHID")]
    repository_phid: Option<String>,
    #[serde(rename = "diffPHID")]
    diff_phid: String,
    #[serde(rename = "bugzilla.bug-id", default)]
    bug_id: Option<String>,
}

#[derive(Deserialize)]
struct StatusField {
    value: RevisionStatus,
}

impl From<RevisionItem> for Revision {
    fn from(item: RevisionItem) -> Self {
        Self {
            id: RevisionId(item.id),
            phid: Phid::from(item.phid),
            title: item.fields.title,
            status: item.fields.status.value,
            repository_phid: item.fields.repository_phid.map(Phid::from),
            diff_phid: Phid::from(item.fields.diff_phid),
            bug_id: item
                .fields
                .bug_id
                .and_then(|b| b.trim().parse::<u64>().ok()),
        }
    }
}

#[derive(Deserialize)]
struct EdgeItem {
    #[serde(rename = "sourcePHID")]
    source_phid: String,
    #[serde(rename = "edgeType")]
    edge_type: String,
    #[serde(rename = "destinationPHID")]
    destination_phid: String,
}

#[derive(Deserialize)]
struct DiffItem {
    id: u64,
    phid: String,
    fields: DiffFields,
}

#[derive(Deserialize)]
struct DiffFields {
    #[serde(rename = "revisionPHID")]
    revision_phid: Option<String>,
    #[serde(rename = "repositoryPHID")]
    repository_phid: Option<String>,
    #[serde(default)]
    refs: Vec<DiffRef>,
}

#[derive(Deserialize)]
struct DiffRef {
    #[serde(rename = "type")]
    kind: String,
    identifier: Option<String>,
}

impl From<DiffItem> for DiffDescriptor {
    fn from(item: DiffItem) -> Self {
        let base_revision = item
            .fields
            .refs
            .into_iter()
            .find(|r| r.kind == "base")
            .and_then(|r| r.identifier);
        Self {
            id: DiffId(item.id),
            phid: Phid::from(item.phid),
            revision_phid: item.fields.revision_phid.map(Phid::from),
            repository_phid: item.fields.repository_phid.map(Phid::from),
            base_revision,
        }
    }
}

#[derive(Deserialize)]
struct CreatedDiff {
    phid: String,
}

#[derive(Deserialize)]
struct EditResult {
    object: EditedObject,
}

#[derive(Deserialize)]
struct EditedObject {
    id: u64,
    phid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhoAmI {
    user_name: String,
    primary_email: String,
}

/// Review service client speaking Conduit over HTTPS
pub struct ConduitService {
    client: Client,
    base_url: Url,
    api_url: Url,
    token: String,
    retry: RetryPolicy,
}

impl ConduitService {
    /// Create a new Conduit client
    ///
    /// # Arguments
    /// * `base_url` - Web root of the review service, e.g. `https://phabricator.example.com/`
    /// * `token` - Conduit API token
    /// * `retry` - Retry policy for transient failures
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, token: String, retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("invalid review service URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let api_url = base_url
            .join("api/")
            .map_err(|e| Error::Config(format!("invalid review service URL: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_url,
            token,
            retry,
        })
    }

    /// Call a Conduit method, retrying transient failures
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.retry
            .run(method, move || self.call_once(method, params.clone()))
            .await
    }

    async fn call_once<T: DeserializeOwned>(&self, method: &str, mut params: Value) -> Result<T> {
        debug!(method, "calling conduit");
        params["__conduit__"] = json!({ "token": self.token });

        let url = self
            .api_url
            .join(method)
            .map_err(|e| Error::Internal(format!("invalid conduit method '{method}': {e}")))?;

        let response: ConduitResponse<T> = self
            .client
            .post(url)
            .form(&[("params", params.to_string()), ("output", "json".to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(code) = response.error_code {
            return Err(Error::Conduit {
                code,
                info: response.error_info.unwrap_or_default(),
            });
        }

        response
            .result
            .ok_or_else(|| Error::RemoteLookupFailed(format!("{method} returned no result")))
    }

    /// Call a `*.search` method and follow its cursor until exhausted
    async fn search_all<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Vec<T>> {
        self.search_pages(method, params, SEARCH_PAGE_SIZE).await
    }

    async fn search_pages<T: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Value,
        page_size: u32,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        params["limit"] = json!(page_size);
        loop {
            let page: SearchPage<T> = self.call(method, params.clone()).await?;
            items.extend(page.data);
            match page.cursor.after {
                Some(after) if !after.is_null() => params["after"] = after,
                _ => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ReviewService for ConduitService {
    async fn search_repository(&self, short_name: &str) -> Result<Option<RepositoryDescriptor>> {
        debug!(short_name, "searching repository");
        let items: Vec<RepositoryItem> = self
            .search_all(
                "diffusion.repository.search",
                json!({ "constraints": { "shortNames": [short_name] } }),
            )
            .await?;

        if items.len() > 1 {
            return Err(Error::RemoteLookupFailed(format!(
                "{} repositories match short name '{short_name}'",
                items.len()
            )));
        }

        Ok(items.into_iter().next().map(|item| RepositoryDescriptor {
            phid: Phid::from(item.phid),
            short_name: item
                .fields
                .short_name
                .unwrap_or_else(|| short_name.to_string()),
            name: item.fields.name,
        }))
    }

    async fn search_revisions_by_id(&self, ids: &[RevisionId]) -> Result<Vec<Revision>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
        let items: Vec<RevisionItem> = self
            .search_all(
                "differential.revision.search",
                json!({ "constraints": { "ids": ids } }),
            )
            .await?;
        Ok(items.into_iter().map(Revision::from).collect())
    }

    async fn search_revisions_by_phid(&self, phids: &[Phid]) -> Result<Vec<Revision>> {
        if phids.is_empty() {
            return Ok(vec![]);
        }
        let items: Vec<RevisionItem> = self
            .search_all(
                "differential.revision.search",
                json!({ "constraints": { "phids": phids } }),
            )
            .await?;
        Ok(items.into_iter().map(Revision::from).collect())
    }

    async fn search_edges(&self, phids: &[Phid]) -> Result<Vec<RevisionEdge>> {
        if phids.is_empty() {
            return Ok(vec![]);
        }
        let items: Vec<EdgeItem> = self
            .search_pages(
                "edge.search",
                json!({
                    "sourcePHIDs": phids,
                    "types": ["revision.parent", "revision.child"],
                }),
                EDGE_SEARCH_LIMIT,
            )
            .await?;

        let edges = items
            .into_iter()
            .filter_map(|item| {
                let kind = match item.edge_type.as_str() {
                    "revision.parent" => EdgeKind::Parent,
                    "revision.child" => EdgeKind::Child,
                    _ => return None,
                };
                Some(RevisionEdge {
                    source: Phid::from(item.source_phid),
                    destination: Phid::from(item.destination_phid),
                    kind,
                })
            })
            .collect::<Vec<_>>();
        debug!(sources = phids.len(), edges = edges.len(), "fetched edges");
        Ok(edges)
    }

    async fn search_diffs(&self, phids: &[Phid]) -> Result<Vec<DiffDescriptor>> {
        if phids.is_empty() {
            return Ok(vec![]);
        }
        let items: Vec<DiffItem> = self
            .search_all(
                "differential.diff.search",
                json!({ "constraints": { "phids": phids } }),
            )
            .await?;
        Ok(items.into_iter().map(DiffDescriptor::from).collect())
    }

    async fn get_raw_diff(&self, diff_id: DiffId) -> Result<String> {
        debug!(diff_id = diff_id.0, "fetching raw diff");
        self.call("differential.getrawdiff", json!({ "diffID": diff_id.0 }))
            .await
    }

    async fn create_raw_diff(&self, diff: &str, repository: &Phid) -> Result<Phid> {
        debug!(repository = %repository, bytes = diff.len(), "creating raw diff");
        let created: CreatedDiff = self
            .call(
                "differential.createrawdiff",
                json!({ "diff": diff, "repositoryPHID": repository }),
            )
            .await?;
        debug!(phid = %created.phid, "created raw diff");
        Ok(Phid::from(created.phid))
    }

    async fn edit_revision(
        &self,
        object: Option<&Phid>,
        transactions: &[Transaction],
    ) -> Result<RevisionRef> {
        debug!(object = ?object, count = transactions.len(), "editing revision");
        let mut params = json!({ "transactions": transactions });
        if let Some(phid) = object {
            params["objectIdentifier"] = json!(phid);
        }
        let result: EditResult = self.call("differential.revision.edit", params).await?;
        Ok(RevisionRef {
            id: RevisionId(result.object.id),
            phid: Phid::from(result.object.phid),
        })
    }

    async fn whoami(&self) -> Result<Requester> {
        let me: WhoAmI = self.call("user.whoami", json!({})).await?;
        Ok(Requester {
            username: me.user_name,
            email: me.primary_email,
        })
    }

    fn revision_url(&self, id: RevisionId) -> String {
        self.base_url
            .join(&id.to_string())
            .map_or_else(|_| id.to_string(), |u| u.to_string())
    }
}
