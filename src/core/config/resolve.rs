//! Turning the stored config into the settings a run actually uses.
//!
//! Precedence, highest first: command-line overrides, environment,
//! `config.toml`, compiled-in defaults. Empty strings count as unset.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::data::Config;
use crate::core::generation::{builtin_system_message, Conversation, GenerationConfig};
use crate::core::pipeline::{ChatPipeline, TokenSources};
use crate::core::request::AuthStrategy;
use crate::core::share::{SharingPublisher, DEFAULT_SHARE_ENDPOINT, DEFAULT_SHARE_URL_BASE};
use crate::core::verification::{
    HttpScoreChallenge, InteractiveChallenge, ScoreChallenge, ScoreTokenProvider, TokenKind,
    VerificationPolicy, DEFAULT_SCORE_SITE_KEY,
};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.nexusapi.tech/nexus/v1/chat/completions";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_API_ENDPOINT: &str = "PALAVER_API_ENDPOINT";

/// The endpoint compiled into this build.
pub fn default_api_endpoint() -> &'static str {
    option_env!("PALAVER_DEFAULT_API_ENDPOINT").unwrap_or(DEFAULT_API_ENDPOINT)
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub verification: Option<VerificationPolicy>,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Signing here is already resolved against `endpoint`, never `Auto`.
    pub auth: AuthStrategy,
    pub score_site_key: String,
    pub score_token_url: Option<String>,
    pub custom_headers: BTreeMap<String, String>,
    pub system_message: String,
    pub chat_config: GenerationConfig,
    pub share_endpoint: String,
    pub share_url_base: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Config {
    pub fn resolve(&self, overrides: &Overrides) -> ResolvedSettings {
        self.resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve against an explicit environment lookup.
    pub fn resolve_with<F>(&self, overrides: &Overrides, env: F) -> ResolvedSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = non_empty(overrides.endpoint.clone())
            .or_else(|| non_empty(env(ENV_API_ENDPOINT)))
            .or_else(|| non_empty(self.api_endpoint.clone()))
            .unwrap_or_else(|| default_api_endpoint().to_string());

        let api_key = non_empty(overrides.api_key.clone())
            .or_else(|| non_empty(env(ENV_API_KEY)))
            .or_else(|| non_empty(self.api_key.clone()));

        let mut chat_config = self.default_chat_config.clone().unwrap_or_default();
        if let Some(model) = non_empty(overrides.model.clone()) {
            chat_config.model = model;
        }

        let auth = AuthStrategy {
            signing: self.signing.resolve(&endpoint),
            verification: overrides.verification.unwrap_or(self.verification),
        };

        ResolvedSettings {
            api_key,
            auth,
            endpoint,
            score_site_key: non_empty(self.score_site_key.clone())
                .unwrap_or_else(|| DEFAULT_SCORE_SITE_KEY.to_string()),
            score_token_url: non_empty(self.score_token_url.clone()),
            custom_headers: self.custom_headers.clone(),
            system_message: self
                .default_system_message
                .clone()
                .unwrap_or_else(|| builtin_system_message().to_string()),
            chat_config,
            share_endpoint: non_empty(self.share_endpoint.clone())
                .unwrap_or_else(|| DEFAULT_SHARE_ENDPOINT.to_string()),
            share_url_base: non_empty(self.share_url_base.clone())
                .unwrap_or_else(|| DEFAULT_SHARE_URL_BASE.to_string()),
        }
    }
}

impl ResolvedSettings {
    /// Providers for the token kinds the policy asks for. The interactive
    /// challenge is owned by whoever hosts the widget, so it is passed in.
    pub fn token_sources(
        &self,
        client: &reqwest::Client,
        interactive: Option<InteractiveChallenge>,
    ) -> TokenSources {
        let score = self.auth.verification.wants(TokenKind::Score).then(|| {
            let library = self.score_token_url.as_ref().map(|url| {
                let broker: Arc<dyn ScoreChallenge> =
                    Arc::new(HttpScoreChallenge::new(client.clone(), url.clone()));
                broker
            });
            ScoreTokenProvider::new(library, self.score_site_key.clone())
        });

        TokenSources {
            policy: self.auth.verification,
            score,
            interactive: interactive
                .filter(|_| self.auth.verification.wants(TokenKind::Interactive)),
        }
    }

    pub fn pipeline(&self, client: reqwest::Client, tokens: TokenSources) -> ChatPipeline {
        ChatPipeline::new(client, self.endpoint.clone())
            .with_api_key(self.api_key.clone())
            .with_auth(self.auth)
            .with_custom_headers(self.custom_headers.clone())
            .with_token_sources(tokens)
    }

    pub fn publisher(&self, client: reqwest::Client) -> SharingPublisher {
        SharingPublisher::with_endpoints(
            client,
            self.share_endpoint.clone(),
            self.share_url_base.clone(),
        )
    }

    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(None, &self.system_message, self.chat_config.clone())
    }
}
