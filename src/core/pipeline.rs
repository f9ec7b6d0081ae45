//! The completion pipeline: tokens, request, transport, decoder.

use std::collections::BTreeMap;

use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::core::decoder::decode_stream;
use crate::core::generation::GenerationConfig;
use crate::core::message::Message;
use crate::core::request::{AuthStrategy, CallMode, PreparedRequest, RequestBuilder};
use crate::core::transport::{CompletionError, CompletionTransport};
use crate::core::verification::{
    gather_tokens, InteractiveChallenge, ScoreTokenProvider, VerificationError, VerificationPolicy,
    VerificationTokenProvider, VerificationTokens,
};

pub const ACTION_COMPLETE: &str = "chat_completion";
pub const ACTION_STREAM: &str = "chat_completion_stream";
pub const ACTION_SHARE: &str = "share_conversation";

/// Text deltas of one streamed reply.
pub type DeltaStream = BoxStream<'static, String>;

/// Token sources consulted before each send.
#[derive(Clone, Default)]
pub struct TokenSources {
    pub policy: VerificationPolicy,
    pub score: Option<ScoreTokenProvider>,
    pub interactive: Option<InteractiveChallenge>,
}

impl TokenSources {
    pub async fn gather(&self, action: &str) -> Result<VerificationTokens, VerificationError> {
        let mut providers: Vec<&dyn VerificationTokenProvider> = Vec::new();
        if let Some(score) = self.score.as_ref() {
            providers.push(score);
        }
        if let Some(interactive) = self.interactive.as_ref() {
            providers.push(interactive);
        }
        gather_tokens(self.policy, action, &providers).await
    }
}

#[derive(Clone)]
pub struct ChatPipeline {
    transport: CompletionTransport,
    endpoint: String,
    api_key: Option<String>,
    auth: AuthStrategy,
    custom_headers: BTreeMap<String, String>,
    tokens: TokenSources,
}

impl ChatPipeline {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            transport: CompletionTransport::new(client),
            endpoint: endpoint.into(),
            api_key: None,
            auth: AuthStrategy::default(),
            custom_headers: BTreeMap::new(),
            tokens: TokenSources::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_custom_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.custom_headers = headers;
        self
    }

    pub fn with_token_sources(mut self, tokens: TokenSources) -> Self {
        self.tokens = tokens;
        self
    }

    /// Build the request for already-gathered tokens. No I/O.
    pub fn prepare(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tokens: &VerificationTokens,
        session: Option<&str>,
        mode: CallMode,
    ) -> PreparedRequest {
        RequestBuilder::new(&self.endpoint, messages, config)
            .api_key(self.api_key.as_deref())
            .auth(self.auth)
            .custom_headers(&self.custom_headers)
            .tokens(tokens)
            .session(session)
            .build(mode)
    }

    /// Whole-response completion.
    pub async fn complete(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        session: Option<&str>,
    ) -> Result<Value, CompletionError> {
        let tokens = self.tokens.gather(ACTION_COMPLETE).await?;
        let request = self.prepare(messages, config, &tokens, session, CallMode::Once);
        self.transport.complete_once(&request).await
    }

    /// Streamed completion. Errors that the endpoint signals by status are
    /// returned here; once the stream is handed back it only ends, it never
    /// fails.
    pub async fn stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        session: Option<&str>,
    ) -> Result<DeltaStream, CompletionError> {
        let tokens = self.tokens.gather(ACTION_STREAM).await?;
        let request = self.prepare(messages, config, &tokens, session, CallMode::Stream);
        let response = self.transport.complete_streaming(&request).await?;
        debug!(model = %config.model, "Completion stream opened");
        Ok(decode_stream(response.bytes_stream()).boxed())
    }
}
