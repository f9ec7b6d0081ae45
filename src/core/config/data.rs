use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::generation::GenerationConfig;
use crate::core::request::RequestSigning;
use crate::core::verification::VerificationPolicy;

/// Settings persisted in `config.toml`.
///
/// Every field is optional; unset values fall back to the compiled-in
/// defaults when the pipeline is assembled.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Completion endpoint (full URL, not a base)
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub signing: RequestSigning,
    #[serde(default)]
    pub verification: VerificationPolicy,
    pub score_site_key: Option<String>,
    /// Broker that mints score tokens; without one score tokens are empty
    pub score_token_url: Option<String>,
    /// Extra headers sent with every completion request
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    pub default_system_message: Option<String>,
    pub default_chat_config: Option<GenerationConfig>,
    pub share_endpoint: Option<String>,
    pub share_url_base: Option<String>,
}

/// Get a user-friendly display string for a path
/// Converts paths under the home directory to `~` notation on Unix-like systems
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn set_custom_header(&mut self, name: String, value: String) {
        self.custom_headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.custom_headers.insert(name, value);
    }

    /// Returns whether a header was removed. Names match case-insensitively.
    pub fn remove_custom_header(&mut self, name: &str) -> bool {
        let before = self.custom_headers.len();
        self.custom_headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        before != self.custom_headers.len()
    }

    /// The chat config to edit in place, seeded from the defaults.
    pub fn chat_config_mut(&mut self) -> &mut GenerationConfig {
        self.default_chat_config.get_or_insert_with(GenerationConfig::default)
    }
}
