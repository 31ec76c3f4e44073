// Client for the remote reading-progress API

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::domain::{ProgressRecord, mapping};

/// The slice of the remote progress API the sync engine depends on.
///
/// [`ProgressApiClient`] is the HTTP implementation; tests substitute an in-memory one.
#[async_trait::async_trait]
pub trait RemoteProgress: Send + Sync {
    /// Whether requests carry a credential. Unauthorised clients are never called directly.
    fn is_authorized(&self) -> bool;

    async fn get_one(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>>;

    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>>;

    /// Returns the record as stored by the server, which doubles as the acknowledgment.
    async fn upsert(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<ProgressRecord>;

    async fn delete(&self, book_id: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct ProgressApiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ProgressApiClient {
    /// Create a new client with the given base URL (e.g. "https://books.example.com/api").
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating ProgressApiClient");
        Ok(ProgressApiClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        })
    }

    /// Return a client with the provided API key set (Bearer). An empty key leaves the
    /// client unauthorised.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    /// Apply a per-request timeout. A hung request counts as a transient failure.
    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn progress_url(&self, book_id: &str) -> String {
        self.url(&format!("/progress/{}", book_id))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// GET /progress/{book_id}. A 404 means the server has no progress for the book.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_progress(&self, book_id: &str) -> anyhow::Result<Option<RemoteProgressDto>> {
        let url = self.progress_url(book_id);
        tracing::debug!(%url, "GET progress");
        let resp = self.authorize(self.client.get(&url)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = resp.error_for_status()?.text().await?;
        parse_json(&body, "RemoteProgressDto").map(Some)
    }

    /// GET /progress
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_progress(&self) -> anyhow::Result<Vec<RemoteProgressDto>> {
        let url = self.url("/progress");
        tracing::debug!(%url, "GET all progress");
        let resp = self.authorize(self.client.get(&url)).send().await?;
        let body = resp.error_for_status()?.text().await?;
        parse_json(&body, "Vec<RemoteProgressDto>")
    }

    /// POST /progress
    #[tracing::instrument(level = "debug", skip(self, req), fields(book_id = %req.book_id, percentage = req.percentage))]
    pub async fn upsert_progress(
        &self,
        req: &UpsertProgressRequest<'_>,
    ) -> anyhow::Result<RemoteProgressDto> {
        let url = self.url("/progress");
        tracing::debug!(%url, "POST progress");
        let resp = self
            .authorize(self.client.post(&url))
            .json(req)
            .send()
            .await?;
        let body = resp.error_for_status()?.text().await?;
        parse_json(&body, "RemoteProgressDto")
    }

    /// DELETE /progress/{book_id}
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_progress(&self, book_id: &str) -> anyhow::Result<()> {
        let url = self.progress_url(book_id);
        tracing::debug!(%url, "DELETE progress");
        let resp = self.authorize(self.client.delete(&url)).send().await?;
        resp.error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteProgress for ProgressApiClient {
    fn is_authorized(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get_one(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        Ok(self
            .get_progress(book_id)
            .await?
            .map(|dto| mapping::map_remote_progress(&dto)))
    }

    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>> {
        Ok(self
            .list_progress()
            .await?
            .iter()
            .map(mapping::map_remote_progress)
            .collect())
    }

    async fn upsert(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<ProgressRecord> {
        let req = UpsertProgressRequest {
            book_id,
            position,
            percentage,
        };
        let dto = self.upsert_progress(&req).await?;
        Ok(mapping::map_remote_progress(&dto))
    }

    async fn delete(&self, book_id: &str) -> anyhow::Result<()> {
        self.delete_progress(book_id).await
    }
}

fn parse_json<T: DeserializeOwned>(body: &str, what: &str) -> anyhow::Result<T> {
    match serde_json::from_str::<T>(body) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            let snippet_len = body.len().min(2000);
            let snippet = body.get(..snippet_len).unwrap_or(body);
            tracing::error!(error = %e, body_snippet = %snippet, "failed to parse {}", what);
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgressDto {
    pub book_id: String,
    pub position: Option<String>,
    #[serde(default, deserialize_with = "crate::remote_client::de::percentage_from_str_or_num")]
    pub percentage: u8,
    /// Server-assigned time of the last update
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProgressRequest<'a> {
    pub book_id: &'a str,
    pub position: Option<&'a str>,
    pub percentage: u8,
}

/// Internal serde helpers
pub mod de {
    use serde::{Deserialize, Deserializer};

    /// Accept a percentage as an integer, a float or a numeric string; the result is
    /// rounded and clamped to 0 - 100. null/"" -> 0.
    pub fn percentage_from_str_or_num<'de, D>(deserializer: D) -> Result<u8, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrStr {
            Int(i64),
            Float(f64),
            Str(String),
        }

        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        let raw = match val {
            None => 0.0,
            Some(NumOrStr::Int(n)) => n as f64,
            Some(NumOrStr::Float(f)) => f,
            Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        if !raw.is_finite() {
            return Ok(0);
        }
        Ok(raw.round().clamp(0.0, 100.0) as u8)
    }
}
