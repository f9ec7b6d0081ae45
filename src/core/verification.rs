//! Proof-of-human tokens attached to outgoing requests.
//!
//! Two independent schemes are supported:
//! - a score-based challenge that is executed on demand for a named action
//!   ([`ScoreTokenProvider`]), and
//! - an interactive challenge completed out of band by the user, whose
//!   latest token is held until a request consumes it
//!   ([`InteractiveChallenge`]).
//!
//! Neither scheme is allowed to block a send: a missing token is simply an
//! absent field in the request body.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

pub const DEFAULT_SCORE_SITE_KEY: &str = "6Lf9B3oqAAAAAPemzZE9SYPkj3lYSlqYbf7qun9K";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Score,
    Interactive,
}

impl TokenKind {
    /// Request body field carrying a token of this kind.
    pub fn field_name(self) -> &'static str {
        match self {
            TokenKind::Score => "recaptcha_token",
            TokenKind::Interactive => "turnstile_token",
        }
    }
}

/// Which token kinds a deployment wants on each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPolicy {
    #[default]
    None,
    Score,
    Interactive,
    Both,
}

impl VerificationPolicy {
    pub fn wants(self, kind: TokenKind) -> bool {
        matches!(
            (self, kind),
            (VerificationPolicy::Both, _)
                | (VerificationPolicy::Score, TokenKind::Score)
                | (VerificationPolicy::Interactive, TokenKind::Interactive)
        )
    }
}

/// The tokens gathered for one outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationTokens {
    pub score: Option<String>,
    pub interactive: Option<String>,
}

impl VerificationTokens {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: TokenKind) -> Option<&str> {
        let token = match kind {
            TokenKind::Score => self.score.as_deref(),
            TokenKind::Interactive => self.interactive.as_deref(),
        };
        token.filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct VerificationError {
    kind: TokenKind,
    message: String,
}

impl VerificationError {
    pub fn new(kind: TokenKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} verification failed: {}",
            self.kind.field_name(),
            self.message
        )
    }
}

impl std::error::Error for VerificationError {}

#[async_trait]
pub trait VerificationTokenProvider: Send + Sync {
    fn kind(&self) -> TokenKind;

    /// Fetch a single-use token scoped to `action`. An empty string means
    /// no token is available and the request should go out without one.
    async fn fetch_token(&self, action: &str) -> Result<String, VerificationError>;
}

/// The challenge library behind score-based tokens.
#[async_trait]
pub trait ScoreChallenge: Send + Sync {
    async fn ready(&self) -> Result<(), VerificationError>;

    async fn execute(&self, site_key: &str, action: &str) -> Result<String, VerificationError>;
}

#[derive(Clone)]
pub struct ScoreTokenProvider {
    library: Option<Arc<dyn ScoreChallenge>>,
    site_key: String,
}

impl ScoreTokenProvider {
    pub fn new(library: Option<Arc<dyn ScoreChallenge>>, site_key: impl Into<String>) -> Self {
        Self {
            library,
            site_key: site_key.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(None, DEFAULT_SCORE_SITE_KEY)
    }
}

#[async_trait]
impl VerificationTokenProvider for ScoreTokenProvider {
    fn kind(&self) -> TokenKind {
        TokenKind::Score
    }

    async fn fetch_token(&self, action: &str) -> Result<String, VerificationError> {
        let Some(library) = self.library.as_ref() else {
            debug!(action, "Score challenge library unavailable; sending without token");
            return Ok(String::new());
        };

        library.ready().await?;
        let token = library.execute(&self.site_key, action).await?;
        debug!(action, token_len = token.len(), "Score token issued");
        Ok(token)
    }
}

#[derive(Serialize)]
struct BrokerRequest<'a> {
    site_key: &'a str,
    action: &'a str,
}

#[derive(Deserialize)]
struct BrokerResponse {
    token: String,
}

/// Score challenge served by an HTTP token broker.
///
/// The broker receives `{site_key, action}` and answers `{token}`.
pub struct HttpScoreChallenge {
    client: reqwest::Client,
    url: String,
}

impl HttpScoreChallenge {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ScoreChallenge for HttpScoreChallenge {
    async fn ready(&self) -> Result<(), VerificationError> {
        if self.url.trim().is_empty() {
            return Err(VerificationError::new(TokenKind::Score, "no token broker URL configured"));
        }
        Ok(())
    }

    async fn execute(&self, site_key: &str, action: &str) -> Result<String, VerificationError> {
        let to_error =
            |err: reqwest::Error| VerificationError::new(TokenKind::Score, err.to_string());

        let response = self
            .client
            .post(&self.url)
            .json(&BrokerRequest { site_key, action })
            .send()
            .await
            .map_err(to_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::new(
                TokenKind::Score,
                format!("token broker returned {status}: {body}"),
            ));
        }

        let parsed = response.json::<BrokerResponse>().await.map_err(to_error)?;
        Ok(parsed.token)
    }
}

/// Interactive challenge state shared between the widget and the pipeline.
///
/// The widget reports outcomes through an [`InteractiveCallback`]; the
/// pipeline never drives the challenge and only reads whatever token is
/// held at send time.
#[derive(Clone)]
pub struct InteractiveChallenge {
    tx: Arc<watch::Sender<Option<String>>>,
}

/// Handle given to the widget integration.
#[derive(Clone)]
pub struct InteractiveCallback {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for InteractiveChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractiveChallenge {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn callback(&self) -> InteractiveCallback {
        InteractiveCallback {
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Take the held token. A token authorizes one request only.
    pub fn take(&self) -> Option<String> {
        let mut taken = None;
        self.tx.send_if_modified(|slot| {
            taken = slot.take();
            taken.is_some()
        });
        taken
    }

    /// Wait for the widget to deliver the next token.
    ///
    /// Returns `None` if every callback handle and the challenge itself
    /// have been dropped.
    pub async fn next_token(&self) -> Option<String> {
        let mut rx = self.tx.subscribe();
        rx.mark_unchanged();
        loop {
            rx.changed().await.ok()?;
            if let Some(token) = rx.borrow_and_update().clone() {
                return Some(token);
            }
        }
    }
}

impl InteractiveCallback {
    pub fn on_success(&self, token: impl Into<String>) {
        let token = token.into();
        debug!(token_len = token.len(), "Interactive challenge completed");
        self.tx.send_replace(Some(token));
    }

    pub fn on_expire(&self) {
        debug!("Interactive challenge token expired");
        self.tx.send_replace(None);
    }

    pub fn on_error(&self) {
        debug!("Interactive challenge reported an error");
        self.tx.send_replace(None);
    }
}

#[async_trait]
impl VerificationTokenProvider for InteractiveChallenge {
    fn kind(&self) -> TokenKind {
        TokenKind::Interactive
    }

    async fn fetch_token(&self, _action: &str) -> Result<String, VerificationError> {
        Ok(self.take().unwrap_or_default())
    }
}

/// Gather the tokens `policy` asks for, one provider after the other.
///
/// Each fetch completes before the next starts, and all complete before the
/// caller builds its request.
pub async fn gather_tokens(
    policy: VerificationPolicy,
    action: &str,
    providers: &[&dyn VerificationTokenProvider],
) -> Result<VerificationTokens, VerificationError> {
    let mut tokens = VerificationTokens::none();
    for provider in providers {
        let kind = provider.kind();
        if !policy.wants(kind) {
            continue;
        }
        let token = provider.fetch_token(action).await?;
        let token = (!token.is_empty()).then_some(token);
        match kind {
            TokenKind::Score => tokens.score = token,
            TokenKind::Interactive => tokens.interactive = token,
        }
    }
    Ok(tokens)
}
