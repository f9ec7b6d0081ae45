//! HTTP exchange with the completion endpoint and failure classification.

use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::chat_stream::extract_error_summary;
use crate::core::request::PreparedRequest;
use crate::core::verification::VerificationError;

const MODEL_NOT_FOUND_MARKER: &str = "model_not_found";
const INSUFFICIENT_QUOTA_MARKER: &str = "insufficient_quota";

/// Everything that can stop a completion before or while it is sent.
///
/// Each variant renders as one human-readable string; most append a line
/// of guidance to the raw server text so the operator knows what to change.
#[derive(Debug)]
pub enum CompletionError {
    /// The request never produced an HTTP response.
    Network(String),
    /// 401/403: the key was refused.
    Unauthorized { status: u16, body: String },
    /// 404/405 whose body mentions `model_not_found`.
    ModelUnavailable { status: u16, body: String },
    /// 404/405 without a model hint: the URL itself is wrong.
    InvalidEndpoint { status: u16, body: String },
    /// Body mentions `insufficient_quota`.
    QuotaExceeded { status: u16, body: String },
    /// 429 without a quota hint.
    RateLimited { body: String },
    /// Any other non-success status, body surfaced as-is.
    Status { status: u16, body: String },
    /// A success response whose body could not be decoded.
    InvalidResponse(String),
    /// A required verification token could not be obtained.
    Verification(VerificationError),
}

impl CompletionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Unauthorized { status, .. }
            | CompletionError::ModelUnavailable { status, .. }
            | CompletionError::InvalidEndpoint { status, .. }
            | CompletionError::QuotaExceeded { status, .. }
            | CompletionError::Status { status, .. } => Some(*status),
            CompletionError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            _ => None,
        }
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Network(message) => write!(f, "Network error: {message}"),
            CompletionError::Unauthorized { body, .. } => write!(
                f,
                "{body}\nThe endpoint rejected the API key. Check that it is valid for this endpoint."
            ),
            CompletionError::ModelUnavailable { body, .. } => write!(
                f,
                "{body}\nPlease ensure that your account has access to the requested model."
            ),
            CompletionError::InvalidEndpoint { status, .. } => write!(
                f,
                "Invalid API endpoint (HTTP {status})! Check the configured completion endpoint."
            ),
            CompletionError::QuotaExceeded { body, .. } => write!(
                f,
                "{body}\nWe recommend changing your API endpoint or API key."
            ),
            CompletionError::RateLimited { body } => write!(f, "{body}\nRate limited!"),
            CompletionError::Status { status, body } => {
                if body.trim().is_empty() {
                    write!(f, "Request failed with HTTP {status}")
                } else {
                    f.write_str(body)
                }
            }
            CompletionError::InvalidResponse(message) => {
                write!(f, "Invalid response from completion endpoint: {message}")
            }
            CompletionError::Verification(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CompletionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompletionError::Verification(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VerificationError> for CompletionError {
    fn from(err: VerificationError) -> Self {
        CompletionError::Verification(err)
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Network(err.to_string())
    }
}

/// Map a non-success streaming response onto the error taxonomy.
pub fn classify_stream_failure(status: StatusCode, body: String) -> CompletionError {
    let code = status.as_u16();
    if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
        return if body.contains(MODEL_NOT_FOUND_MARKER) {
            CompletionError::ModelUnavailable { status: code, body }
        } else {
            CompletionError::InvalidEndpoint { status: code, body }
        };
    }
    if body.contains(INSUFFICIENT_QUOTA_MARKER) {
        return CompletionError::QuotaExceeded { status: code, body };
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return CompletionError::RateLimited { body };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return CompletionError::Unauthorized { status: code, body };
    }
    CompletionError::Status { status: code, body }
}

#[derive(Clone)]
pub struct CompletionTransport {
    client: reqwest::Client,
}

impl CompletionTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &PreparedRequest) -> Result<reqwest::Response, CompletionError> {
        debug!(url = %request.url, "Sending completion request");
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .send()
            .await?;
        debug!(status = %response.status(), "Completion endpoint responded");
        Ok(response)
    }

    /// POST and wait for the whole reply. The JSON is returned untouched.
    pub async fn complete_once(&self, request: &PreparedRequest) -> Result<Value, CompletionError> {
        let response = self.send(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let summary = error_summary(&text);
            let err = CompletionError::Status {
                status: status.as_u16(),
                body: text,
            };
            return Err(logged(err, &summary));
        }

        serde_json::from_str(&text).map_err(|err| CompletionError::InvalidResponse(err.to_string()))
    }

    /// POST a streaming request and classify the status before any body
    /// bytes are read. On success the response comes back unconsumed.
    pub async fn complete_streaming(
        &self,
        request: &PreparedRequest,
    ) -> Result<reqwest::Response, CompletionError> {
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(status = %status, error = %err, "Failed to read error response body");
                return Err(CompletionError::Network(err.to_string()));
            }
        };
        let summary = error_summary(&text);
        Err(logged(classify_stream_failure(status, text), &summary))
    }
}

fn error_summary(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_default()
}

fn logged(err: CompletionError, summary: &str) -> CompletionError {
    warn!(status = ?err.status(), summary = %summary, "Completion request failed");
    err
}
