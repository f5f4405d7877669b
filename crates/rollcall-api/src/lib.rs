//! rollcall-api: Typed client for the attendance backend's JSON API.
//!
//! One method per endpoint, grouped by resource. No retries and no caching:
//! every call is a single round-trip and failures come back as [`ApiError`].

pub mod camera;
pub mod people;
pub mod sessions;
pub mod tags;

use std::time::Duration;

use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use camera::{
    ConnectionTest, DuplicateOf, FaceDeletion, FaceSource, ModelStatus, RecognitionMatch,
    RecognitionResponse, RegisteredFace, RegistrationOutcome, TrainingDetails, TrainingSummary,
};
pub use people::PersonFaces;
pub use sessions::{FinishResponse, MarkAttendanceResponse};

/// Default base URL when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Text suitable for an operator notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Transport(e) if e.is_timeout() => "request timed out".into(),
            ApiError::Transport(e) if e.is_connect() => "backend unreachable".into(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// HTTP client bound to one backend.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let trimmed = base_url.trim_end_matches('/');
        Url::parse(trimmed).map_err(|e| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/users/`.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(&url).query(query).send().await?;
        decode(resp).await
    }

    pub(crate) async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, %method, "request");
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(req.send().await?).await
    }

    /// Like [`send`](Self::send), but 4xx bodies that carry a `success`
    /// flag are decoded as `T` instead of failing. The recognition endpoints
    /// report domain outcomes ("no face detected") this way.
    pub(crate) async fn send_outcome<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        decode_outcome(status, &text)
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "DELETE");
        let resp = self.client.delete(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(status_error(status, &text))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(status_error(status, &text));
    }
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn decode_outcome<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T, ApiError> {
    if status.is_success() {
        return Ok(serde_json::from_str(text)?);
    }
    if status.is_client_error() {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if value.get("success").is_some() {
                return Ok(serde_json::from_value(value)?);
            }
        }
    }
    Err(status_error(status, text))
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> ApiError {
    ApiError::Status {
        status: status.as_u16(),
        message: error_message(status, body),
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend uses `message`, `error` or `detail` depending on the view.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    trimmed.chars().take(200).collect()
}
