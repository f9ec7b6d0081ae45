//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod model_list;
pub mod say;
pub mod settings;
pub mod share;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::model_list::list_models;
use crate::cli::say::{run_say, SayOptions};
use crate::cli::settings::{apply_set, apply_unset, SettingError, SettingKey};
use crate::cli::share::run_share;
use crate::core::config::data::{path_display, Config};
use crate::core::config::resolve::{Overrides, ENV_API_ENDPOINT, ENV_API_KEY};
use crate::core::session::session_from_cookies;
use crate::core::verification::{InteractiveChallenge, VerificationPolicy};
use crate::logging::{init_tracing, LOG_ENV_VAR};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt:  ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\ntarget: ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    "\nrustc:  ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "palaver")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Streaming chat completions from the terminal")]
#[command(
    long_about = "Palaver sends conversations to an OpenAI-compatible chat-completion endpoint \
(including Azure OpenAI deployments) and streams the reply to the terminal. It can also \
publish a saved conversation to a public share service.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY         API key (overrides the config file)\n\
  PALAVER_API_ENDPOINT   Completion endpoint (overrides the config file)\n\
  PALAVER_LOG            Log filter directives, e.g. 'palaver=debug' (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Completion endpoint URL for this run
    #[arg(short = 'e', long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// API key for this run
    #[arg(short = 'k', long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model to use for this run
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Verification tokens to send: none, score, interactive, both
    #[arg(long, global = true, value_parser = parse_policy, value_name = "POLICY")]
    pub verification: Option<VerificationPolicy>,

    /// Interactive challenge token obtained from the widget
    #[arg(long, global = true, value_name = "TOKEN")]
    pub challenge_token: Option<String>,

    /// Session id to send with the request
    #[arg(long, global = true, conflicts_with = "cookies")]
    pub session: Option<String>,

    /// Cookie header to read the session id from
    #[arg(long, global = true, value_name = "COOKIE_HEADER")]
    pub cookies: Option<String>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt and print the reply
    Say {
        /// Prompt text (multiple words are joined)
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Publish a saved conversation (JSON) and print its public URL
    Share {
        /// Conversation file: {title, messages, config} or a bare message list
        path: PathBuf,
    },
    /// List the built-in model catalog
    Models,
    /// Show the current configuration and where it is stored
    Config,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Header name, for `unset header`
        value: Option<String>,
    },
}

fn parse_policy(input: &str) -> Result<VerificationPolicy, String> {
    serde_json::from_value(serde_json::Value::String(input.to_ascii_lowercase()))
        .map_err(|_| format!("expected none, score, interactive or both, got '{input}'"))
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            verification: self.verification,
        }
    }

    /// `--session` wins; otherwise the session cookie, if any.
    pub fn session(&self) -> Option<String> {
        self.session
            .clone()
            .filter(|session| !session.is_empty())
            .or_else(|| self.cookies.as_deref().and_then(session_from_cookies))
    }

    /// A challenge already solved out of band, handed to the pipeline as if
    /// the widget had reported it.
    pub fn interactive_challenge(&self) -> Option<InteractiveChallenge> {
        self.challenge_token.as_ref().map(|token| {
            let challenge = InteractiveChallenge::new();
            challenge.callback().on_success(token.clone());
            challenge
        })
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    let config_path = Config::get_config_path()?;

    match &args.command {
        Commands::Set { key, value } => {
            let Some(key) = key else {
                Config::load_from_path(&config_path)?.print_all();
                print_setting_keys();
                return Ok(());
            };
            run_setting(&config_path, key, |config, key| {
                apply_set(config, key, value)
            })
        }
        Commands::Unset { key, value } => run_setting(&config_path, key, |config, key| {
            apply_unset(config, key, value.as_deref())
        }),
        Commands::Config => {
            println!("📁 {}", path_display(&config_path));
            Config::load_from_path(&config_path)?.print_all();
            Ok(())
        }
        Commands::Models => {
            let settings = Config::load_from_path(&config_path)?.resolve(&args.overrides());
            list_models(&settings.chat_config.model);
            Ok(())
        }
        Commands::Say { prompt, no_stream } => {
            let settings = Config::load_from_path(&config_path)?.resolve(&args.overrides());
            run_say(
                reqwest::Client::new(),
                &settings,
                SayOptions {
                    prompt: prompt.join(" "),
                    stream: !no_stream,
                    session: args.session(),
                    interactive: args.interactive_challenge(),
                },
            )
            .await
        }
        Commands::Share { path } => {
            let settings = Config::load_from_path(&config_path)?.resolve(&args.overrides());
            run_share(
                reqwest::Client::new(),
                path,
                &settings,
                args.interactive_challenge(),
                args.session().as_deref(),
            )
            .await
        }
    }
}

fn print_setting_keys() {
    println!();
    println!("Available keys:");
    for key in SettingKey::ALL {
        println!("  {}", key.name());
    }
    println!();
    println!("Environment overrides: {ENV_API_KEY}, {ENV_API_ENDPOINT}, {LOG_ENV_VAR}");
}

fn run_setting<F>(config_path: &std::path::Path, key: &str, apply: F) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&mut Config, SettingKey) -> Result<String, SettingError>,
{
    let outcome = SettingKey::parse(key).and_then(|key| {
        Config::mutate_at(config_path, |config| {
            apply(config, key).map_err(|err| -> Box<dyn Error> { Box::new(err) })
        })
        .map_err(|err| match err.downcast::<SettingError>() {
            Ok(setting_err) => *setting_err,
            Err(other) => SettingError::ConfigError(other.to_string()),
        })
    });

    match outcome {
        Ok(message) => {
            println!("{message}");
            Ok(())
        }
        Err(err) => {
            err.print();
            std::process::exit(err.exit_code());
        }
    }
}
