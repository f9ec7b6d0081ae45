//! Error types for settings operations.

use std::fmt;

/// Errors that can occur when modifying configuration settings.
#[derive(Debug)]
pub enum SettingError {
    /// The provided setting key is not recognized.
    UnknownKey(String),
    /// The value is not one of the accepted choices.
    InvalidChoice {
        key: &'static str,
        input: String,
        choices: &'static str,
    },
    /// The value could not be parsed as a number in range.
    InvalidNumber {
        key: &'static str,
        input: String,
        range: &'static str,
    },
    /// The model is not in the catalog.
    UnknownModel(String),
    /// Required arguments are missing.
    MissingArgs {
        hint: &'static str,
        example: &'static str,
    },
    /// An error occurred while persisting the configuration.
    ConfigError(String),
}

impl SettingError {
    /// Print the error message to stderr with appropriate formatting.
    pub fn print(&self) {
        match self {
            SettingError::UnknownKey(key) => {
                eprintln!("❌ Unknown config key: {key}");
                eprintln!("   Run 'palaver set' to list the available keys.");
            }
            SettingError::InvalidChoice { choices, .. } => {
                eprintln!("❌ {self}");
                eprintln!("   Expected one of: {choices}");
            }
            SettingError::InvalidNumber { range, .. } => {
                eprintln!("❌ {self}");
                eprintln!("   Expected a number in {range}");
            }
            SettingError::UnknownModel(model) => {
                eprintln!("❌ Unknown model: {model}");
                eprintln!("   Run 'palaver models' to list available models.");
            }
            SettingError::MissingArgs { hint, example } => {
                eprintln!("⚠️  {hint}");
                eprintln!("Example: {example}");
            }
            SettingError::ConfigError(msg) => {
                eprintln!("❌ Failed to save configuration: {msg}");
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownKey(key) => write!(f, "Unknown config key: {key}"),
            SettingError::InvalidChoice { key, input, .. } => {
                write!(f, "Invalid value for {key}: {input}")
            }
            SettingError::InvalidNumber { key, input, .. } => {
                write!(f, "Invalid number for {key}: {input}")
            }
            SettingError::UnknownModel(model) => write!(f, "Unknown model: {model}"),
            SettingError::MissingArgs { hint, .. } => write!(f, "{hint}"),
            SettingError::ConfigError(msg) => write!(f, "Config error: {msg}"),
        }
    }
}

impl std::error::Error for SettingError {}
