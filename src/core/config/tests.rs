use super::data::Config;
use super::io::ConfigError;
use super::printing::mask_secret;
use super::resolve::{default_api_endpoint, Overrides, ENV_API_ENDPOINT, ENV_API_KEY};
use crate::core::generation::{GenerationConfig, DEFAULT_CHAT_TITLE};
use crate::core::message::Role;
use crate::core::pipeline::TokenSources;
use crate::core::request::{CallMode, RequestSigning};
use crate::core::verification::{
    InteractiveChallenge, VerificationPolicy, VerificationTokens, DEFAULT_SCORE_SITE_KEY,
};
use std::collections::HashMap;
use tempfile::TempDir;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn missing_file_loads_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(config, Config::default());
}

#[test]
fn config_round_trips_through_disk() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        api_endpoint: Some("https://example.openai.azure.com".to_string()),
        signing: RequestSigning::AzureHeader,
        verification: VerificationPolicy::Both,
        ..Default::default()
    };
    config.set_custom_header("X-Team".to_string(), "core".to_string());
    config.chat_config_mut().temperature = 0.5;
    config.save_to_path(&config_path).expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    let raw = std::fs::read_to_string(&config_path).expect("config readable");
    assert!(raw.contains("signing = \"azure-header\""));
    assert!(raw.contains("verification = \"both\""));
}

#[test]
fn invalid_toml_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "api_endpoint = [").expect("write config");

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn partial_chat_config_fills_defaults() {
    let config: Config = toml::from_str(
        r#"
        [default_chat_config]
        model = "gpt-4o-mini"
        "#,
    )
    .expect("parse");
    let chat = config.default_chat_config.expect("chat config present");
    assert_eq!(chat.model, "gpt-4o-mini");
    assert_eq!(chat.temperature, 1.0);
    assert_eq!(chat.top_p, 1.0);
}

#[test]
fn mutate_at_persists_only_on_success() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");

    Config::mutate_at(&config_path, |config| {
        config.api_key = Some("sk-first".to_string());
        Ok(())
    })
    .expect("mutate failed");

    let failed: Result<(), _> = Config::mutate_at(&config_path, |config| {
        config.api_key = Some("sk-second".to_string());
        Err("rejected".into())
    });
    assert!(failed.is_err());

    let loaded = Config::load_from_path(&config_path).expect("load failed");
    assert_eq!(loaded.api_key.as_deref(), Some("sk-first"));
}

#[test]
fn custom_headers_replace_case_insensitively() {
    let mut config = Config::default();
    config.set_custom_header("x-org".to_string(), "a".to_string());
    config.set_custom_header("X-Org".to_string(), "b".to_string());
    assert_eq!(config.custom_headers.len(), 1);
    let value = config.custom_headers.get("X-Org");
    assert_eq!(value.map(String::as_str), Some("b"));

    assert!(config.remove_custom_header("X-ORG"));
    assert!(!config.remove_custom_header("x-org"));
}

#[test]
fn resolve_uses_compiled_defaults() {
    let resolved = Config::default().resolve_with(&Overrides::default(), no_env);
    assert_eq!(resolved.endpoint, default_api_endpoint());
    assert_eq!(resolved.api_key, None);
    assert_eq!(resolved.score_site_key, DEFAULT_SCORE_SITE_KEY);
    assert_eq!(resolved.chat_config, GenerationConfig::default());
    assert_eq!(resolved.share_url_base, "https://shareg.pt");
}

#[test]
fn auto_signing_resolves_against_endpoint() {
    let config = Config {
        api_endpoint: Some("https://team.openai.azure.com".to_string()),
        ..Default::default()
    };
    let resolved = config.resolve_with(&Overrides::default(), no_env);
    assert_eq!(resolved.auth.signing, RequestSigning::AzureHeader);
}

#[test]
fn resolved_auth_reaches_prepared_request() {
    let config = Config {
        api_endpoint: Some("https://team.openai.azure.com".to_string()),
        api_key: Some("az-key".to_string()),
        ..Default::default()
    };
    let resolved = config.resolve_with(&Overrides::default(), no_env);
    let pipeline = resolved.pipeline(reqwest::Client::new(), TokenSources::default());

    let prepared = pipeline.prepare(
        &[],
        &resolved.chat_config,
        &VerificationTokens::none(),
        None,
        CallMode::Once,
    );
    assert!(prepared.url.contains("/openai/deployments/"));
    assert_eq!(prepared.headers["api-key"], "az-key");
    assert_eq!(prepared.headers["authorization"], "Bearer az-key");
}

#[test]
fn resolve_precedence_cli_then_env_then_file() {
    let config = Config {
        api_endpoint: Some("https://file.example/v1/chat/completions".to_string()),
        api_key: Some("sk-file".to_string()),
        ..Default::default()
    };
    let env: HashMap<&str, &str> = HashMap::from([
        (ENV_API_ENDPOINT, "https://env.example/chat"),
        (ENV_API_KEY, ""),
    ]);
    let lookup = |name: &str| env.get(name).map(|value| value.to_string());

    let resolved = config.resolve_with(&Overrides::default(), lookup);
    assert_eq!(resolved.endpoint, "https://env.example/chat");
    // an empty environment value does not mask the file
    assert_eq!(resolved.api_key.as_deref(), Some("sk-file"));

    let overrides = Overrides {
        endpoint: Some("https://cli.example/chat".to_string()),
        api_key: Some("sk-cli".to_string()),
        model: Some("o1-mini".to_string()),
        verification: Some(VerificationPolicy::Interactive),
    };
    let resolved = config.resolve_with(&overrides, lookup);
    assert_eq!(resolved.endpoint, "https://cli.example/chat");
    assert_eq!(resolved.api_key.as_deref(), Some("sk-cli"));
    assert_eq!(resolved.chat_config.model, "o1-mini");
    assert_eq!(resolved.auth.verification, VerificationPolicy::Interactive);
    assert_eq!(resolved.auth.signing, RequestSigning::Bearer);
}

#[test]
fn token_sources_follow_policy() {
    let client = reqwest::Client::new();
    let challenge = InteractiveChallenge::new();

    let config = Config {
        verification: VerificationPolicy::Score,
        ..Default::default()
    };
    let sources = config
        .resolve_with(&Overrides::default(), no_env)
        .token_sources(&client, Some(challenge.clone()));
    assert!(sources.score.is_some());
    assert!(sources.interactive.is_none());

    let sources = Config::default()
        .resolve_with(&Overrides::default(), no_env)
        .token_sources(&client, Some(challenge));
    assert!(sources.score.is_none());
    assert!(sources.interactive.is_none());
}

#[test]
fn new_conversation_uses_configured_system_message() {
    let config = Config {
        default_system_message: Some("Be brief.".to_string()),
        ..Default::default()
    };
    let conversation = config
        .resolve_with(&Overrides::default(), no_env)
        .new_conversation();
    assert_eq!(conversation.title, DEFAULT_CHAT_TITLE);
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].role, Role::System);
    assert_eq!(conversation.messages[0].content, "Be brief.");

    let silent = Config {
        default_system_message: Some(String::new()),
        ..Default::default()
    };
    let conversation = silent
        .resolve_with(&Overrides::default(), no_env)
        .new_conversation();
    assert!(conversation.messages.is_empty());
}

#[test]
fn describe_masks_api_key() {
    let config = Config {
        api_key: Some("sk-abcdefghijkl".to_string()),
        ..Default::default()
    };
    let lines = config.describe();
    assert!(lines.iter().any(|line| line == "  api-key: ****ijkl"));
    assert!(lines.iter().any(|line| line == "  signing: auto"));
    assert_eq!(mask_secret("short"), "********");
}
