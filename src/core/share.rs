//! Publishing finished conversations to a public share service.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::message::Message;
use crate::core::verification::{TokenKind, VerificationError, VerificationTokens};

pub const DEFAULT_SHARE_ENDPOINT: &str = "https://sharegpt.com/api/conversations";
pub const DEFAULT_SHARE_URL_BASE: &str = "https://shareg.pt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareSpeaker {
    Human,
    Gpt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareItem {
    pub from: ShareSpeaker,
    pub value: String,
}

/// Conversation payload in the share service's format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePayload {
    #[serde(rename = "avatarUrl")]
    pub avatar_url: String,
    pub items: Vec<ShareItem>,
}

impl SharePayload {
    /// System turns are not part of a shared conversation.
    pub fn from_messages(messages: &[Message]) -> Self {
        let items = messages
            .iter()
            .filter(|message| !message.role.is_system())
            .map(|message| ShareItem {
                from: if message.role.is_assistant() {
                    ShareSpeaker::Gpt
                } else {
                    ShareSpeaker::Human
                },
                value: message.content.clone(),
            })
            .collect();
        Self {
            avatar_url: String::new(),
            items,
        }
    }
}

#[derive(Serialize)]
struct ShareRequest<'a> {
    #[serde(flatten)]
    payload: &'a SharePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    recaptcha_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turnstile_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
}

#[derive(Deserialize)]
struct ShareResponse {
    id: String,
}

#[derive(Debug)]
pub enum ShareError {
    Network(String),
    Rejected { status: u16, body: String },
    InvalidResponse(String),
    Verification(VerificationError),
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::Network(message) => {
                write!(f, "Error submitting shared conversation: {message}")
            }
            ShareError::Rejected { body, .. } => {
                write!(f, "Error submitting shared conversation: {body}")
            }
            ShareError::InvalidResponse(message) => {
                write!(f, "Share service returned an unexpected response: {message}")
            }
            ShareError::Verification(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ShareError {}

impl From<VerificationError> for ShareError {
    fn from(err: VerificationError) -> Self {
        ShareError::Verification(err)
    }
}

#[derive(Clone)]
pub struct SharingPublisher {
    client: reqwest::Client,
    endpoint: String,
    url_base: String,
}

impl SharingPublisher {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, DEFAULT_SHARE_ENDPOINT, DEFAULT_SHARE_URL_BASE)
    }

    pub fn with_endpoints(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        url_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            url_base: url_base.into(),
        }
    }

    pub fn public_url(&self, id: &str) -> String {
        crate::utils::url::construct_api_url(&self.url_base, id)
    }

    /// Post the conversation and return its public URL.
    pub async fn publish(
        &self,
        payload: &SharePayload,
        tokens: &VerificationTokens,
        session: Option<&str>,
    ) -> Result<String, ShareError> {
        let request = ShareRequest {
            payload,
            recaptcha_token: tokens.get(TokenKind::Score),
            turnstile_token: tokens.get(TokenKind::Interactive),
            session: session.filter(|value| !value.is_empty()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| ShareError::Network(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ShareError::Network(err.to_string()))?;
        if !status.is_success() {
            return Err(ShareError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ShareResponse = serde_json::from_str(&text)
            .map_err(|err| ShareError::InvalidResponse(err.to_string()))?;
        let url = self.public_url(&parsed.id);
        debug!(url = %url, "Conversation shared");
        Ok(url)
    }
}
