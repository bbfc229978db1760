//! HTTP clients for Remote Settings (Kinto) and the Bugzilla REST API.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use ucem_core::bug::{BUG_FIELDS, BugList};
use ucem_core::config::BUGZILLA_REST_LOCATION;
use ucem_core::{Bug, Tier};

use crate::SyncError;
use crate::store::{CollectionStatus, RecordStore, SnapshotSource};
use crate::tracker::{BugQuery, BugTracker};

const NEXT_PAGE_HEADER: &str = "Next-Page";
const BUGZILLA_API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";

/// Remote Settings credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { user: String, password: String },
    /// Sent as the `Authorization` header value.
    Header(String),
}

impl Auth {
    /// `user:password` is basic auth, `Bearer …` is sent as given, anything
    /// else is treated as a bearer token.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        if token.starts_with("Bearer ") {
            return Auth::Header(token.to_string());
        }
        match token.split_once(':') {
            Some((user, password)) => Auth::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Auth::Header(format!("Bearer {token}")),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
            Auth::Header(value) => request.header(AUTHORIZATION, value),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { user, .. } => write!(f, "Basic({user}:***)"),
            Auth::Header(_) => f.write_str("Header(***)"),
        }
    }
}

/// Fail with [`SyncError::Server`] on a non-success status.
async fn check(resp: Response) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Server {
        status: status.as_u16(),
        body,
    })
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CollectionMeta {
    #[serde(default)]
    status: Option<CollectionStatus>,
}

/// Kinto client for one collection on a Remote Settings writer server.
pub struct RemoteSettingsClient {
    client: reqwest::Client,
    collection_url: String,
    auth: Option<Auth>,
}

impl RemoteSettingsClient {
    /// `server_location` is the API root, e.g. `https://remote-settings.mozilla.org/v1`.
    pub fn new(server_location: &str, auth: Option<Auth>, bucket: &str, collection: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            collection_url: format!(
                "{}/buckets/{bucket}/collections/{collection}",
                server_location.trim_end_matches('/')
            ),
            auth,
        }
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn records_url(&self) -> String {
        format!("{}/records", self.collection_url)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/records/{id}", self.collection_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => auth.apply(request),
            None => request,
        }
    }
}

#[async_trait]
impl RecordStore for RemoteSettingsClient {
    async fn list_records(&self) -> Result<Vec<Value>, SyncError> {
        let mut url = self.records_url();
        let mut records = Vec::new();
        loop {
            debug!(url = %url, "fetching records page");
            let resp = check(self.authed(self.client.get(&url)).send().await?).await?;
            let next = resp
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let page: Envelope<Vec<Value>> = resp.json().await?;
            records.extend(page.data);
            match next {
                Some(next) => url = next,
                None => break,
            }
        }
        info!(count = records.len(), "listed remote records");
        Ok(records)
    }

    async fn upsert_record(&self, id: &str, data: &Value) -> Result<(), SyncError> {
        let url = self.record_url(id);
        check(
            self.authed(self.client.put(&url))
                .json(&json!({ "data": data }))
                .send()
                .await?,
        )
        .await?;
        info!(record_id = %id, "record written");
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), SyncError> {
        let url = self.record_url(id);
        check(self.authed(self.client.delete(&url)).send().await?).await?;
        info!(record_id = %id, "record deleted");
        Ok(())
    }

    async fn delete_all_records(&self) -> Result<(), SyncError> {
        let url = self.records_url();
        check(self.authed(self.client.delete(&url)).send().await?).await?;
        info!("all records deleted");
        Ok(())
    }

    async fn collection_status(&self) -> Result<CollectionStatus, SyncError> {
        let resp = check(
            self.authed(self.client.get(&self.collection_url))
                .send()
                .await?,
        )
        .await?;
        let meta: Envelope<CollectionMeta> = resp.json().await?;
        Ok(meta.data.status.unwrap_or(CollectionStatus::Unknown))
    }

    async fn set_collection_status(&self, status: CollectionStatus) -> Result<(), SyncError> {
        check(
            self.authed(self.client.patch(&self.collection_url))
                .json(&json!({ "data": { "status": status } }))
                .send()
                .await?,
        )
        .await?;
        info!(?status, "collection status changed");
        Ok(())
    }
}

/// Unauthenticated reader of the records each tier publishes.
pub struct PublishedSnapshotClient {
    client: reqwest::Client,
}

impl PublishedSnapshotClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for PublishedSnapshotClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for PublishedSnapshotClient {
    async fn published_records(&self, tier: Tier) -> Result<Vec<Value>, SyncError> {
        let url = tier
            .published_records_location()
            .ok_or(SyncError::NoSnapshot(tier))?;
        info!(tier = %tier, url, "fetching published records");
        let resp = check(self.client.get(url).send().await?).await?;
        let body: Envelope<Vec<Value>> = resp.json().await?;
        Ok(body.data)
    }
}

/// Bugzilla endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugzillaConfig {
    pub base_url: String,
    /// Required for every write.
    pub api_key: Option<String>,
}

impl Default for BugzillaConfig {
    fn default() -> Self {
        Self {
            base_url: BUGZILLA_REST_LOCATION.to_string(),
            api_key: None,
        }
    }
}

#[derive(Deserialize)]
struct CreatorList {
    #[serde(default)]
    bugs: Vec<CreatorEntry>,
}

#[derive(Deserialize)]
struct CreatorEntry {
    creator: Option<String>,
}

pub struct BugzillaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BugzillaClient {
    pub fn new(config: BugzillaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|k| !k.is_empty()),
        }
    }

    fn bug_url(&self, bug_id: u64) -> String {
        format!("{}/bug/{bug_id}", self.base_url)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(BUGZILLA_API_KEY_HEADER, key),
            None => request,
        }
    }

    fn require_key(&self, action: &'static str) -> Result<&str, SyncError> {
        self.api_key
            .as_deref()
            .ok_or(SyncError::MissingApiKey(action))
    }

    async fn update_bug(&self, bug_id: u64, key: &str, body: &Value) -> Result<(), SyncError> {
        check(
            self.client
                .put(self.bug_url(bug_id))
                .header(BUGZILLA_API_KEY_HEADER, key)
                .json(body)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BugTracker for BugzillaClient {
    async fn query_bugs(&self, query: &BugQuery) -> Result<Vec<Bug>, SyncError> {
        let url = format!("{}/bug", self.base_url);
        info!(product = %query.product, component = %query.component, "querying bugs");
        let request = self.client.get(&url).query(&[
            ("product", query.product.as_str()),
            ("component", query.component.as_str()),
            ("resolution", query.resolution.as_str()),
            ("query_format", "advanced"),
            ("include_fields", BUG_FIELDS),
        ]);
        let resp = check(self.with_key(request).send().await?).await?;
        let list: BugList = resp.json().await?;
        info!(count = list.bugs.len(), "fetched bugs");
        Ok(list.bugs)
    }

    async fn bug_creator(&self, bug_id: u64) -> Result<Option<String>, SyncError> {
        let request = self
            .client
            .get(self.bug_url(bug_id))
            .query(&[("include_fields", "creator")]);
        let resp = check(self.with_key(request).send().await?).await?;
        let list: CreatorList = resp.json().await?;
        Ok(list.bugs.into_iter().next().and_then(|b| b.creator))
    }

    async fn close_bug(
        &self,
        bug_id: u64,
        resolution: &str,
        comment: &str,
    ) -> Result<(), SyncError> {
        let key = self.require_key("close bugs")?;
        let body = json!({
            "status": "RESOLVED",
            "resolution": resolution,
            "comment": { "body": comment },
        });
        self.update_bug(bug_id, key, &body).await?;
        info!(bug_id, resolution, "bug closed");
        Ok(())
    }

    async fn need_info(
        &self,
        bug_id: u64,
        comment: &str,
        requestee: &str,
    ) -> Result<(), SyncError> {
        let key = self.require_key("request info")?;
        let body = json!({
            "flags": [{ "name": "needinfo", "status": "?", "requestee": requestee }],
            "comment": { "body": comment },
        });
        self.update_bug(bug_id, key, &body).await?;
        info!(bug_id, requestee, "needinfo requested");
        Ok(())
    }
}
