//! `palaver share <file>`: publish a saved conversation.

use std::error::Error;
use std::path::Path;

use serde::Deserialize;

use crate::core::config::resolve::ResolvedSettings;
use crate::core::generation::Conversation;
use crate::core::message::Message;
use crate::core::pipeline::ACTION_SHARE;
use crate::core::share::SharePayload;
use crate::core::verification::InteractiveChallenge;

/// Either a whole saved conversation or just its messages.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationFile {
    Full(Conversation),
    Messages(Vec<Message>),
}

pub fn read_messages(path: &Path) -> Result<Vec<Message>, Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
    let parsed: ConversationFile = serde_json::from_str(&contents)
        .map_err(|err| format!("{} is not a saved conversation: {err}", path.display()))?;
    Ok(match parsed {
        ConversationFile::Full(conversation) => conversation.messages,
        ConversationFile::Messages(messages) => messages,
    })
}

pub async fn run_share(
    client: reqwest::Client,
    path: &Path,
    settings: &ResolvedSettings,
    interactive: Option<InteractiveChallenge>,
    session: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let messages = read_messages(path)?;
    let payload = SharePayload::from_messages(&messages);
    if payload.items.is_empty() {
        return Err("Nothing to share: the conversation has no user or assistant turns".into());
    }

    let tokens = settings
        .token_sources(&client, interactive)
        .gather(ACTION_SHARE)
        .await?;
    let url = settings
        .publisher(client)
        .publish(&payload, &tokens, session)
        .await?;
    println!("🔗 {url}");
    Ok(())
}
