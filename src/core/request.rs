//! Outbound completion request construction.
//!
//! Everything here is pure: the builder turns messages, sampling settings,
//! the API key with its [`AuthStrategy`] and already-fetched verification
//! tokens into a [`PreparedRequest`] without touching the network.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::generation::GenerationConfig;
use crate::core::message::Message;
use crate::core::verification::{TokenKind, VerificationPolicy, VerificationTokens};

pub const AZURE_HOST_MARKER: &str = "openai.azure.com";
pub const AZURE_API_VERSION: &str = "2023-03-15-preview";
pub const AZURE_API_VERSION_GPT4: &str = "2023-07-01-preview";
pub const AZURE_KEY_HEADER: &str = "api-key";

/// Deployment names for models whose Azure id differs from the public one.
const AZURE_MODEL_MAP: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "gpt-35-turbo"),
    ("gpt-3.5-turbo-16k", "gpt-35-turbo-16k"),
    ("gpt-3.5-turbo-1106", "gpt-35-turbo-1106"),
    ("gpt-3.5-turbo-0125", "gpt-35-turbo-0125"),
];

/// How the API key is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestSigning {
    /// Azure-style when the endpoint is an Azure host, bearer otherwise.
    #[default]
    Auto,
    Bearer,
    /// `api-key` header plus deployment-routed endpoint path.
    AzureHeader,
    None,
}

impl RequestSigning {
    pub fn resolve(self, endpoint: &str) -> RequestSigning {
        match self {
            RequestSigning::Auto if is_azure_endpoint(endpoint) => RequestSigning::AzureHeader,
            RequestSigning::Auto => RequestSigning::Bearer,
            other => other,
        }
    }
}

/// Request signing combined with the verification tokens a deployment wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthStrategy {
    #[serde(default)]
    pub signing: RequestSigning,
    #[serde(default)]
    pub verification: VerificationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Once,
    Stream,
}

pub fn is_azure_endpoint(endpoint: &str) -> bool {
    endpoint.contains(AZURE_HOST_MARKER)
}

pub fn azure_deployment_name(model: &str) -> &str {
    AZURE_MODEL_MAP
        .iter()
        .find(|(public, _)| *public == model)
        .map(|(_, deployment)| *deployment)
        .unwrap_or(model)
}

pub fn azure_api_version(deployment: &str) -> &'static str {
    if deployment == "gpt-4" || deployment == "gpt-4-32k" {
        AZURE_API_VERSION_GPT4
    } else {
        AZURE_API_VERSION
    }
}

/// Route `endpoint` to the Azure deployment serving `model`.
///
/// Calling this on an endpoint that already carries the deployment path
/// returns it unchanged.
pub fn azure_endpoint(endpoint: &str, model: &str) -> String {
    let deployment = azure_deployment_name(model);
    let path = format!(
        "openai/deployments/{deployment}/chat/completions?api-version={}",
        azure_api_version(deployment)
    );

    if endpoint.ends_with(&path) {
        return endpoint.to_string();
    }

    let mut routed = endpoint.to_string();
    if !routed.ends_with('/') {
        routed.push('/');
    }
    routed.push_str(&path);
    routed
}

/// JSON body sent to the completion endpoint.
///
/// The penalty fields of [`GenerationConfig`] have no slot here, and
/// `max_tokens` is always serialized as `null`.
#[derive(Debug, Serialize)]
pub struct CompletionBody<'a> {
    pub messages: &'a [Message],
    pub model: &'a str,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recaptcha_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turnstile_token: Option<&'a str>,
}

/// A fully assembled request, ready for the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct RequestBuilder<'a> {
    endpoint: &'a str,
    messages: &'a [Message],
    config: &'a GenerationConfig,
    api_key: Option<&'a str>,
    auth: AuthStrategy,
    custom_headers: Option<&'a BTreeMap<String, String>>,
    tokens: Option<&'a VerificationTokens>,
    session: Option<&'a str>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(endpoint: &'a str, messages: &'a [Message], config: &'a GenerationConfig) -> Self {
        Self {
            endpoint,
            messages,
            config,
            api_key: None,
            auth: AuthStrategy::default(),
            custom_headers: None,
            tokens: None,
            session: None,
        }
    }

    /// Blank keys count as no key at all.
    pub fn api_key(mut self, api_key: Option<&'a str>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = auth;
        self
    }

    pub fn custom_headers(mut self, headers: &'a BTreeMap<String, String>) -> Self {
        self.custom_headers = Some(headers);
        self
    }

    pub fn tokens(mut self, tokens: &'a VerificationTokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn session(mut self, session: Option<&'a str>) -> Self {
        self.session = session.filter(|value| !value.is_empty());
        self
    }

    pub fn build_body(&self, mode: CallMode) -> CompletionBody<'a> {
        let token = |kind: TokenKind| self.tokens.and_then(|tokens| tokens.get(kind));
        CompletionBody {
            messages: self.messages,
            model: &self.config.model,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: None,
            stream: (mode == CallMode::Stream).then_some(true),
            session: self.session,
            recaptcha_token: token(TokenKind::Score),
            turnstile_token: token(TokenKind::Interactive),
        }
    }

    pub fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(custom) = self.custom_headers {
            for (name, value) in custom {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.insert(name, value);
                    }
                    _ => warn!(header = %name, "Skipping invalid custom header"),
                }
            }
        }

        let Some(key) = self.api_key else {
            return headers;
        };
        let signing = self.auth.signing.resolve(self.endpoint);
        if signing == RequestSigning::None {
            return headers;
        }

        match HeaderValue::from_str(&format!("Bearer {key}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("API key contains characters not allowed in a header"),
        }
        if signing == RequestSigning::AzureHeader {
            match HeaderValue::from_str(key) {
                Ok(value) => {
                    headers.insert(AZURE_KEY_HEADER, value);
                }
                Err(_) => warn!("API key contains characters not allowed in the api-key header"),
            }
        }
        headers
    }

    pub fn build_url(&self) -> String {
        let signing = self.auth.signing.resolve(self.endpoint);
        if self.api_key.is_some() && signing == RequestSigning::AzureHeader {
            azure_endpoint(self.endpoint, &self.config.model)
        } else {
            self.endpoint.to_string()
        }
    }

    pub fn build(&self, mode: CallMode) -> PreparedRequest {
        let body = serde_json::to_value(self.build_body(mode))
            .unwrap_or_else(|_| Value::Object(Default::default()));
        PreparedRequest {
            url: self.build_url(),
            headers: self.build_headers(),
            body,
        }
    }
}
