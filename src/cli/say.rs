//! `palaver say`: send one prompt and print the reply.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::config::resolve::ResolvedSettings;
use crate::core::generation::find_model;
use crate::core::message::Message;
use crate::core::verification::InteractiveChallenge;

pub struct SayOptions {
    pub prompt: String,
    pub stream: bool,
    pub session: Option<String>,
    pub interactive: Option<InteractiveChallenge>,
}

/// Assistant text from a whole-response completion, in either the chat or
/// the legacy completion shape.
pub fn reply_text(response: &Value) -> Option<&str> {
    response
        .pointer("/choices/0/message/content")
        .or_else(|| response.pointer("/choices/0/text"))
        .and_then(Value::as_str)
}

/// Estimated spend for a whole-response completion, read from its `usage`
/// block. `None` for models outside the catalog or replies without usage.
pub fn usage_cost(response: &Value, model: &str) -> Option<f64> {
    let spec = find_model(model)?;
    let usage = response.get("usage")?;
    let prompt_tokens = usage.get("prompt_tokens").and_then(Value::as_u64)?;
    let completion_tokens = usage
        .get("completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(spec.estimate_cost(prompt_tokens, completion_tokens))
}

pub async fn run_say(
    client: reqwest::Client,
    settings: &ResolvedSettings,
    options: SayOptions,
) -> Result<(), Box<dyn Error>> {
    if options.prompt.trim().is_empty() {
        return Err("Usage: palaver say <prompt>".into());
    }

    let tokens = settings.token_sources(&client, options.interactive);
    let pipeline = settings.pipeline(client, tokens);

    let mut conversation = settings.new_conversation();
    conversation.messages.push(Message::user(options.prompt));

    if !options.stream {
        let response = pipeline
            .complete(
                &conversation.messages,
                &conversation.config,
                options.session.as_deref(),
            )
            .await?;
        match reply_text(&response) {
            Some(text) => println!("{text}"),
            None => println!("{}", serde_json::to_string_pretty(&response)?),
        }
        if let Some(cost) = usage_cost(&response, &conversation.config.model) {
            eprintln!("💰 Estimated cost: ${cost:.4}");
        }
        return Ok(());
    }

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let (stream_service, mut rx) = ChatStreamService::new();
    let task = stream_service.spawn_stream(StreamParams {
        pipeline: Arc::new(pipeline),
        messages: conversation.messages,
        config: conversation.config,
        session: options.session,
        cancel_token: cancel_token.clone(),
        stream_id: 0,
    });
    drop(stream_service);

    loop {
        match rx.recv().await {
            Some((StreamMessage::Chunk(content), _)) => {
                print!("{content}");
                io::stdout().flush()?;
            }
            Some((StreamMessage::Error(err), _)) => {
                println!();
                return Err(err.into());
            }
            Some((StreamMessage::End, _)) => {
                println!();
                break;
            }
            None => {
                // channel closed without End: the stream was cancelled
                println!();
                debug!("Reply interrupted");
                break;
            }
        }
    }

    task.await?;
    Ok(())
}
