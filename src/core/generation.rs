//! Generation settings and the built-in model catalog.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::message::Message;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_USER_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

const BUILTIN_SYSTEM_MESSAGE: &str = "You are ChatGPT, a large language model trained by OpenAI.
Carefully heed the user's instructions.
Respond using Markdown.";

/// Placeholder replaced with the current local date in system messages.
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Sampling parameters stored alongside a conversation.
///
/// Only `model`, `temperature` and `top_p` reach the completion endpoint.
/// The penalties and `max_tokens` are kept for the collaborator's benefit
/// and are dropped when the request body is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(DEFAULT_USER_MAX_TOKENS),
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl GenerationConfig {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPrice {
    pub price: f64,
    pub unit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub id: &'static str,
    pub max_context: u32,
    pub prompt: TokenPrice,
    pub completion: TokenPrice,
}

const fn per_thousand(price: f64) -> TokenPrice {
    TokenPrice { price, unit: 1000 }
}

pub const MODEL_CATALOG: &[ModelSpec] = &[
    ModelSpec {
        id: "gpt-4o",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
    ModelSpec {
        id: "gpt-4o-mini",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
    ModelSpec {
        id: "o1-preview",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.15),
    },
    ModelSpec {
        id: "o1-mini",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
    ModelSpec {
        id: "claude-3-5-sonnet",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
    ModelSpec {
        id: "gpt-3.5-turbo",
        max_context: 4096,
        prompt: per_thousand(0.0015),
        completion: per_thousand(0.002),
    },
    ModelSpec {
        id: "llama-3.1-405B",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
    ModelSpec {
        id: "llama-3.2-90B",
        max_context: 128_000,
        prompt: per_thousand(0.005),
        completion: per_thousand(0.015),
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelSpec> {
    MODEL_CATALOG.iter().find(|spec| spec.id == id)
}

impl ModelSpec {
    /// Estimated spend in USD for the given token counts.
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let prompt = prompt_tokens as f64 / f64::from(self.prompt.unit) * self.prompt.price;
        let completion =
            completion_tokens as f64 / f64::from(self.completion.unit) * self.completion.price;
        prompt + completion
    }
}

/// The system message compiled into this build, before date expansion.
pub fn builtin_system_message() -> &'static str {
    option_env!("PALAVER_DEFAULT_SYSTEM_MESSAGE").unwrap_or(BUILTIN_SYSTEM_MESSAGE)
}

pub fn render_system_message(template: &str, today: NaiveDate) -> String {
    template.replace(DATE_PLACEHOLDER, &today.format("%Y-%m-%d").to_string())
}

/// A fresh conversation the collaborator can start sending from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub title: String,
    pub messages: Vec<Message>,
    pub config: GenerationConfig,
}

impl Conversation {
    pub fn new(title: Option<String>, system_message: &str, config: GenerationConfig) -> Self {
        let system = render_system_message(system_message, Local::now().date_naive());
        let messages = if system.is_empty() {
            Vec::new()
        } else {
            vec![Message::system(system)]
        };
        Self {
            title: title.unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string()),
            messages,
            config,
        }
    }
}
