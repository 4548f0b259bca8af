//! Builds and sends exactly one reply per admitted event.

use serde_json::Value;

use bridge_slack::{SlackApiError, SlackClient, SlackPostedMessage};

use super::ChatEvent;

/// Sends the reply into the event's thread. Plain `message` events with
/// no block tree get a plain-text post; everything else reuses the
/// event's block structure with the answer substituted in, plus the
/// plain-text fallback field the platform requires for notifications.
pub(super) async fn send_reply(
    slack: &SlackClient,
    event: &ChatEvent,
    answer: &str,
    blocks: &[Value],
) -> Result<SlackPostedMessage, SlackApiError> {
    let thread_ts = event.reply_thread_ts();

    if event.event_type == "message" && event.blocks.is_empty() {
        return slack
            .post_message(&event.channel, answer, Some(thread_ts), None)
            .await;
    }

    let rendered = replace_first_nested_text(blocks, answer).unwrap_or_else(|| blocks.to_vec());
    slack
        .post_message(&event.channel, answer, Some(thread_ts), Some(&rendered))
        .await
}

/// Overwrites the first nested element's `text` with the answer via
/// structural copy-with-replacement; `None` when the tree does not have
/// the expected shape. The input tree is never mutated.
pub(super) fn replace_first_nested_text(blocks: &[Value], answer: &str) -> Option<Vec<Value>> {
    let mut updated = blocks.to_vec();
    let target = updated
        .first_mut()
        .and_then(|block| block.get_mut("elements"))
        .and_then(|elements| elements.get_mut(0))
        .and_then(|element| element.get_mut("elements"))
        .and_then(|inner| inner.get_mut(0))?;
    target["text"] = Value::String(answer.to_string());
    Some(updated)
}
