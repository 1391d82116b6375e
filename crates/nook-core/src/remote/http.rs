//! HTTP client for a Nextcloud Notes compatible REST API.

use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::error::{Error, Result};
use crate::models::{NoteDraft, RemoteId, RemoteNote};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Notes collection path below the server base URL.
pub const NOTES_API_PATH: &str = "/index.php/apps/notes/api/v1/notes";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Basic-auth credentials for the notes server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct HttpNotesClient {
    notes_url: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl HttpNotesClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        Self::with_timeout(
            base_url,
            credentials,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        if credentials.username.trim().is_empty() {
            return Err(Error::InvalidInput("username must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            notes_url: format!("{base_url}{NOTES_API_PATH}"),
            credentials,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(header::ACCEPT, "application/json")
    }

    fn note_url(&self, remote_id: RemoteId) -> String {
        format!("{}/{}", self.notes_url, remote_id.0)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        remote_id: Option<RemoteId>,
    ) -> RemoteResult<reqwest::Response> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, remote_id))
    }

    async fn read_note(response: reqwest::Response) -> RemoteResult<RemoteNote> {
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string());
        let wire = response
            .json::<WireNote>()
            .await
            .map_err(map_reqwest_error)?;
        let mut note = RemoteNote::from(wire);
        if note.etag.is_none() {
            note.etag = etag;
        }
        Ok(note)
    }
}

impl RemoteClient for HttpNotesClient {
    async fn create(&self, draft: &NoteDraft) -> RemoteResult<RemoteNote> {
        let request = self
            .request(reqwest::Method::POST, &self.notes_url)
            .json(&WireDraft::from(draft));
        let response = self.send(request, None).await?;
        Self::read_note(response).await
    }

    async fn update(
        &self,
        remote_id: RemoteId,
        draft: &NoteDraft,
        etag: Option<&str>,
    ) -> RemoteResult<RemoteNote> {
        let mut request = self
            .request(reqwest::Method::PUT, &self.note_url(remote_id))
            .json(&WireDraft::from(draft));
        if let Some(etag) = etag {
            request = request.header(header::IF_MATCH, format!("\"{etag}\""));
        }
        let response = self.send(request, Some(remote_id)).await?;
        Self::read_note(response).await
    }

    async fn delete(&self, remote_id: RemoteId) -> RemoteResult<()> {
        let request = self.request(reqwest::Method::DELETE, &self.note_url(remote_id));
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    async fn list(&self) -> RemoteResult<Vec<RemoteNote>> {
        let request = self.request(reqwest::Method::GET, &self.notes_url);
        let response = self.send(request, None).await?;
        let notes = response
            .json::<Vec<WireNote>>()
            .await
            .map_err(map_reqwest_error)?;
        Ok(notes.into_iter().map(RemoteNote::from).collect())
    }
}

#[derive(Debug, Deserialize)]
struct WireNote {
    id: i64,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    favorite: bool,
    /// Unix seconds
    #[serde(default)]
    modified: i64,
}

impl From<WireNote> for RemoteNote {
    fn from(wire: WireNote) -> Self {
        Self {
            remote_id: RemoteId(wire.id),
            etag: normalize_text_option(wire.etag),
            title: wire.title,
            content: wire.content,
            category: Some(wire.category).filter(|category| !category.is_empty()),
            favorite: wire.favorite,
            modified: wire.modified.saturating_mul(1000),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireDraft<'a> {
    title: &'a str,
    content: &'a str,
    category: &'a str,
    favorite: bool,
    modified: i64,
}

impl<'a> From<&'a NoteDraft> for WireDraft<'a> {
    fn from(draft: &'a NoteDraft) -> Self {
        Self {
            title: &draft.title,
            content: &draft.content,
            category: draft.category.as_deref().unwrap_or_default(),
            favorite: draft.favorite,
            modified: draft.modified / 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn map_reqwest_error(error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Protocol(format!("malformed response: {error}"))
    } else {
        RemoteError::Transport(error.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str, remote_id: Option<RemoteId>) -> RemoteError {
    match (status, remote_id) {
        (StatusCode::NOT_FOUND, Some(remote_id)) => RemoteError::NotFound(remote_id),
        (StatusCode::PRECONDITION_FAILED, Some(remote_id)) => RemoteError::Conflict(remote_id),
        (status, _)
            if status.is_server_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS =>
        {
            RemoteError::Transport(describe_status(status, body))
        }
        (status, _) => RemoteError::Protocol(describe_status(status, body)),
    }
}

fn describe_status(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} (HTTP {})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} (HTTP {})", status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("server URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "server URL must include http:// or https://".to_string(),
        ))
    }
}
