use crate::core::config::data::Config;
use crate::core::generation::GenerationConfig;

fn field(name: &str, value: Option<&str>) -> String {
    format!("  {name}: {}", value.unwrap_or("(unset)"))
}

/// Show only the tail of a key so it can be recognized but not copied.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

impl Config {
    pub fn describe(&self) -> Vec<String> {
        let api_key = self.api_key.as_deref().map(mask_secret);
        let mut lines = vec![
            "Current configuration:".to_string(),
            field("api-endpoint", self.api_endpoint.as_deref()),
            field("api-key", api_key.as_deref()),
            format!("  signing: {}", kebab(&self.signing)),
            format!("  verification: {}", kebab(&self.verification)),
            field("score-site-key", self.score_site_key.as_deref()),
            field("score-token-url", self.score_token_url.as_deref()),
        ];
        if self.custom_headers.is_empty() {
            lines.push("  headers: (none set)".to_string());
        } else {
            lines.push("  headers:".to_string());
            for (name, value) in &self.custom_headers {
                lines.push(format!("    {name}: {value}"));
            }
        }
        lines.push(field("system-message", self.default_system_message.as_deref()));
        let chat = self.default_chat_config.clone().unwrap_or_default();
        lines.extend(describe_chat_config(&chat));
        lines.push(field("share-endpoint", self.share_endpoint.as_deref()));
        lines.push(field("share-url-base", self.share_url_base.as_deref()));
        lines
    }

    pub fn print_all(&self) {
        for line in self.describe() {
            println!("{line}");
        }
    }
}

fn describe_chat_config(chat: &GenerationConfig) -> Vec<String> {
    let max_tokens = chat.max_tokens.map(|value| value.to_string());
    vec![
        format!("  model: {}", chat.model),
        field("max-tokens", max_tokens.as_deref()),
        format!("  temperature: {}", chat.temperature),
        format!("  top-p: {}", chat.top_p),
    ]
}

fn kebab<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}
