//! Turns a raw chat event into a normalized admission decision.

use serde_json::Value;
use tracing::{debug, warn};

use bridge_core::Settings;
use bridge_slack::SlackClient;

use super::{ChatEvent, ProcessedMessage, SlackFileRef};

pub(super) fn admits_user(user: &str, settings: &Settings) -> bool {
    let user = user.trim();
    !user.is_empty() && !settings.ignores_user(user)
}

/// Applies the channel-name filter. An unset filter matches everything;
/// a failed lookup fails open so filter availability never blocks
/// delivery of legitimate messages.
pub(super) async fn channel_matches(
    slack: &SlackClient,
    settings: &Settings,
    channel_id: &str,
) -> bool {
    let Some(expected) = settings.configured_channel_name() else {
        return true;
    };

    match slack.channel_info(channel_id).await {
        Ok(info) => {
            if info.name == expected {
                true
            } else {
                debug!(channel = channel_id, name = %info.name, expected, "not the configured channel");
                false
            }
        }
        Err(error) => {
            warn!(channel = channel_id, error = %error, "channel lookup failed, continuing");
            true
        }
    }
}

/// Event-type gate and per-kind reshaping. Both the text and the block
/// tree are carried forward so the composer can render either.
pub(super) fn classify(event: &ChatEvent, settings: &Settings) -> ProcessedMessage {
    match event.event_type.as_str() {
        "app_mention" if settings.event_types.allows_app_mention() => classify_app_mention(event),
        "message" if settings.event_types.allows_message() => classify_message(event),
        _ => ProcessedMessage::Skip,
    }
}

fn classify_app_mention(event: &ChatEvent) -> ProcessedMessage {
    let mut text = event.text.clone();
    let mut blocks = event.blocks.clone();

    if text.starts_with("<@") {
        text = strip_mention_prefix(&text);
        if let Some(summary) = attached_files_summary(&event.files) {
            text.push_str(&summary);
        }
        blocks = strip_leading_mention(&blocks);
    }

    ProcessedMessage::Process { text, blocks }
}

fn classify_message(event: &ChatEvent) -> ProcessedMessage {
    // Bot-origin messages and mention echoes would loop back replies the
    // bridge already produced, or duplicate an app_mention it handled.
    if event.has_bot_origin() || event.text.starts_with("<@") {
        return ProcessedMessage::Skip;
    }

    let mut text = event.text.clone();
    if let Some(summary) = attached_files_summary(&event.files) {
        text.push_str(&summary);
    }

    ProcessedMessage::Process {
        text,
        blocks: event.blocks.clone(),
    }
}

/// Drops the leading mention token. The mention is always the first
/// token, delimited by the literal `"> "`; without that delimiter the
/// text is returned unchanged.
fn strip_mention_prefix(text: &str) -> String {
    match text.split_once("> ") {
        Some((_, rest)) => rest.to_string(),
        None => text.to_string(),
    }
}

fn attached_files_summary(files: &[SlackFileRef]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    let names = files
        .iter()
        .filter_map(|file| file.name.as_deref())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("\n\nFiles attached: {names}"))
}

/// Removes the block tree's leading mention element so the mention glyph
/// does not duplicate in the rendered reply. Structural copy; the input
/// tree is never mutated.
fn strip_leading_mention(blocks: &[Value]) -> Vec<Value> {
    let mut updated = blocks.to_vec();
    let Some(inner) = updated
        .first_mut()
        .and_then(|block| block.get_mut("elements"))
        .and_then(|elements| elements.get_mut(0))
        .and_then(|element| element.get_mut("elements"))
        .and_then(Value::as_array_mut)
    else {
        return updated;
    };
    if !inner.is_empty() {
        inner.remove(0);
    }
    updated
}
