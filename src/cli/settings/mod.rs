//! `palaver set` / `palaver unset`.
//!
//! Each key maps onto one field of [`Config`]; unsetting restores the
//! compiled-in default for that field.

pub mod error;

pub use error::SettingError;

use serde::de::DeserializeOwned;

use crate::core::config::data::Config;
use crate::core::generation::{find_model, GenerationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    ApiEndpoint,
    ApiKey,
    Signing,
    Verification,
    ScoreSiteKey,
    ScoreTokenUrl,
    Header,
    SystemMessage,
    Model,
    MaxTokens,
    Temperature,
    TopP,
    ShareEndpoint,
    ShareUrlBase,
}

impl SettingKey {
    pub const ALL: [SettingKey; 14] = [
        SettingKey::ApiEndpoint,
        SettingKey::ApiKey,
        SettingKey::Signing,
        SettingKey::Verification,
        SettingKey::ScoreSiteKey,
        SettingKey::ScoreTokenUrl,
        SettingKey::Header,
        SettingKey::SystemMessage,
        SettingKey::Model,
        SettingKey::MaxTokens,
        SettingKey::Temperature,
        SettingKey::TopP,
        SettingKey::ShareEndpoint,
        SettingKey::ShareUrlBase,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::ApiEndpoint => "api-endpoint",
            SettingKey::ApiKey => "api-key",
            SettingKey::Signing => "signing",
            SettingKey::Verification => "verification",
            SettingKey::ScoreSiteKey => "score-site-key",
            SettingKey::ScoreTokenUrl => "score-token-url",
            SettingKey::Header => "header",
            SettingKey::SystemMessage => "system-message",
            SettingKey::Model => "model",
            SettingKey::MaxTokens => "max-tokens",
            SettingKey::Temperature => "temperature",
            SettingKey::TopP => "top-p",
            SettingKey::ShareEndpoint => "share-endpoint",
            SettingKey::ShareUrlBase => "share-url-base",
        }
    }

    pub fn parse(input: &str) -> Result<SettingKey, SettingError> {
        let normalized = input.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| SettingError::UnknownKey(input.to_string()))
    }
}

/// Parse a kebab-case enum value the same way the config file does.
fn parse_choice<T: DeserializeOwned>(
    key: &'static str,
    input: &str,
    choices: &'static str,
) -> Result<T, SettingError> {
    serde_json::from_value(serde_json::Value::String(input.trim().to_ascii_lowercase())).map_err(
        |_| SettingError::InvalidChoice {
            key,
            input: input.to_string(),
            choices,
        },
    )
}

fn parse_unit_range(
    key: &'static str,
    input: &str,
    max: f32,
    range: &'static str,
) -> Result<f32, SettingError> {
    input
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| (0.0..=max).contains(value))
        .ok_or_else(|| SettingError::InvalidNumber {
            key,
            input: input.to_string(),
            range,
        })
}

impl SettingKey {
    /// Hint and example shown when `set` is called without a value.
    fn usage(self) -> (&'static str, &'static str) {
        match self {
            SettingKey::ApiEndpoint => (
                "Provide the completion endpoint URL.",
                "palaver set api-endpoint https://example.openai.azure.com",
            ),
            SettingKey::ApiKey => ("Provide the API key.", "palaver set api-key sk-..."),
            SettingKey::Signing => (
                "Choose how the API key is sent.",
                "palaver set signing azure-header",
            ),
            SettingKey::Verification => (
                "Choose which verification tokens to send.",
                "palaver set verification both",
            ),
            SettingKey::ScoreSiteKey => (
                "Provide the score challenge site key.",
                "palaver set score-site-key 6Lf9...",
            ),
            SettingKey::ScoreTokenUrl => (
                "Provide the score token broker URL.",
                "palaver set score-token-url http://127.0.0.1:8731/token",
            ),
            SettingKey::Header => (
                "Provide a header name and value.",
                "palaver set header X-Org research",
            ),
            SettingKey::SystemMessage => (
                "Provide the system message.",
                "palaver set system-message You are terse. Today is {date}.",
            ),
            SettingKey::Model => ("Provide a model id.", "palaver set model gpt-4o-mini"),
            SettingKey::MaxTokens => ("Provide a token count.", "palaver set max-tokens 2000"),
            SettingKey::Temperature => ("Provide a temperature.", "palaver set temperature 0.7"),
            SettingKey::TopP => ("Provide a top-p value.", "palaver set top-p 0.9"),
            SettingKey::ShareEndpoint => (
                "Provide the share service endpoint.",
                "palaver set share-endpoint https://sharegpt.com/api/conversations",
            ),
            SettingKey::ShareUrlBase => (
                "Provide the public share URL base.",
                "palaver set share-url-base https://shareg.pt",
            ),
        }
    }

    fn missing(self) -> SettingError {
        let (hint, example) = self.usage();
        SettingError::MissingArgs { hint, example }
    }
}

fn require_value(args: &[String], key: SettingKey) -> Result<String, SettingError> {
    let value = args.join(" ");
    if value.trim().is_empty() {
        return Err(key.missing());
    }
    Ok(value)
}

/// Apply `palaver set <key> <args..>` to `config`, returning the message to show.
pub fn apply_set(
    config: &mut Config,
    key: SettingKey,
    args: &[String],
) -> Result<String, SettingError> {
    let name = key.name();
    match key {
        SettingKey::ApiEndpoint => {
            let value = require_value(args, key)?;
            config.api_endpoint = Some(value.clone());
            Ok(format!("✅ Set {name} to: {value}"))
        }
        SettingKey::ApiKey => {
            let value = require_value(args, key)?;
            config.api_key = Some(value);
            Ok(format!("✅ Set {name}"))
        }
        SettingKey::Signing => {
            let value = require_value(args, key)?;
            config.signing = parse_choice(name, &value, "auto, bearer, azure-header, none")?;
            Ok(format!("✅ Set {name} to: {}", value.trim()))
        }
        SettingKey::Verification => {
            let value = require_value(args, key)?;
            config.verification = parse_choice(name, &value, "none, score, interactive, both")?;
            Ok(format!("✅ Set {name} to: {}", value.trim()))
        }
        SettingKey::ScoreSiteKey => {
            let value = require_value(args, key)?;
            config.score_site_key = Some(value.clone());
            Ok(format!("✅ Set {name} to: {value}"))
        }
        SettingKey::ScoreTokenUrl => {
            let value = require_value(args, key)?;
            config.score_token_url = Some(value.clone());
            Ok(format!("✅ Set {name} to: {value}"))
        }
        SettingKey::Header => {
            let (header, rest) = args.split_first().ok_or_else(|| key.missing())?;
            let value = require_value(rest, key)?;
            config.set_custom_header(header.clone(), value.clone());
            Ok(format!("✅ Set header {header}: {value}"))
        }
        SettingKey::SystemMessage => {
            // an empty message is allowed and disables the system turn
            config.default_system_message = Some(args.join(" "));
            Ok(format!("✅ Set {name}"))
        }
        SettingKey::Model => {
            let value = require_value(args, key)?;
            let spec = find_model(value.trim())
                .ok_or_else(|| SettingError::UnknownModel(value.clone()))?;
            config.chat_config_mut().model = spec.id.to_string();
            Ok(format!("✅ Set {name} to: {}", spec.id))
        }
        SettingKey::MaxTokens => {
            let value = require_value(args, key)?;
            let parsed = value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|tokens| *tokens > 0)
                .ok_or_else(|| SettingError::InvalidNumber {
                    key: name,
                    input: value.clone(),
                    range: "1 and above",
                })?;
            config.chat_config_mut().max_tokens = Some(parsed);
            Ok(format!("✅ Set {name} to: {parsed}"))
        }
        SettingKey::Temperature => {
            let value = require_value(args, key)?;
            let parsed = parse_unit_range(name, &value, 2.0, "0 to 2")?;
            config.chat_config_mut().temperature = parsed;
            Ok(format!("✅ Set {name} to: {parsed}"))
        }
        SettingKey::TopP => {
            let value = require_value(args, key)?;
            let parsed = parse_unit_range(name, &value, 1.0, "0 to 1")?;
            config.chat_config_mut().top_p = parsed;
            Ok(format!("✅ Set {name} to: {parsed}"))
        }
        SettingKey::ShareEndpoint => {
            let value = require_value(args, key)?;
            config.share_endpoint = Some(value.clone());
            Ok(format!("✅ Set {name} to: {value}"))
        }
        SettingKey::ShareUrlBase => {
            let value = require_value(args, key)?;
            config.share_url_base = Some(value.clone());
            Ok(format!("✅ Set {name} to: {value}"))
        }
    }
}

/// Apply `palaver unset <key> [arg]`.
pub fn apply_unset(
    config: &mut Config,
    key: SettingKey,
    arg: Option<&str>,
) -> Result<String, SettingError> {
    let name = key.name();
    let defaults = GenerationConfig::default();
    match key {
        SettingKey::ApiEndpoint => config.api_endpoint = None,
        SettingKey::ApiKey => config.api_key = None,
        SettingKey::Signing => config.signing = Default::default(),
        SettingKey::Verification => config.verification = Default::default(),
        SettingKey::ScoreSiteKey => config.score_site_key = None,
        SettingKey::ScoreTokenUrl => config.score_token_url = None,
        SettingKey::Header => {
            let header = arg.ok_or(SettingError::MissingArgs {
                hint: "Name the header to remove.",
                example: "palaver unset header X-Org",
            })?;
            if !config.remove_custom_header(header) {
                return Ok(format!("ℹ️  No header named {header} was set"));
            }
            return Ok(format!("✅ Removed header {header}"));
        }
        SettingKey::SystemMessage => config.default_system_message = None,
        SettingKey::Model => config.chat_config_mut().model = defaults.model.clone(),
        SettingKey::MaxTokens => config.chat_config_mut().max_tokens = defaults.max_tokens,
        SettingKey::Temperature => config.chat_config_mut().temperature = defaults.temperature,
        SettingKey::TopP => config.chat_config_mut().top_p = defaults.top_p,
        SettingKey::ShareEndpoint => config.share_endpoint = None,
        SettingKey::ShareUrlBase => config.share_url_base = None,
    }
    if config.default_chat_config.as_ref() == Some(&defaults) {
        config.default_chat_config = None;
    }
    Ok(format!("✅ Unset {name}"))
}
