//! Event admission and dispatch for inbound Slack webhook deliveries.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use bridge_core::{truncate_for_error, Settings};
use bridge_dify::{ChatBackend, ChatInvokeRequest, DifyClient, StorageSession, UploadedFile};
use bridge_slack::{SlackApiError, SlackClient};

mod classifier;
mod composer;
mod gate;
mod relay;


use relay::UploadStrategy;

const APOLOGY_TEXT: &str =
    "Sorry, I'm having trouble processing your request. Please try again later.";

#[derive(Debug, Clone, Default, Deserialize)]
/// Outer webhook payload: either a verification challenge or an event
/// callback wrapping a [`ChatEvent`].
pub struct WebhookEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<ChatEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
/// The nested Slack event. Read-only input; block trees stay raw JSON.
pub struct ChatEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub files: Vec<SlackFileRef>,
    #[serde(default)]
    pub blocks: Vec<Value>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl ChatEvent {
    /// Thread the reply lands in: the existing thread when present, else
    /// a new thread anchored at this message.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts
            .as_deref()
            .filter(|ts| !ts.is_empty())
            .unwrap_or(&self.ts)
    }

    fn has_bot_origin(&self) -> bool {
        self.bot_id.as_deref().is_some_and(|id| !id.is_empty())
            || self.subtype.as_deref() == Some("bot_message")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Attachment reference bound to the source platform; only lives for the
/// duration of the relay.
pub struct SlackFileRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private_download: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Retry metadata the host extracts from `X-Slack-Retry-Num` and
/// `X-Slack-Retry-Reason`.
pub struct RetrySignal {
    pub attempt: Option<u32>,
    pub reason: Option<String>,
}

impl RetrySignal {
    /// Builds the signal from raw header values. A non-numeric attempt
    /// count is treated as absent; admission filtering must never turn
    /// into a transport failure.
    pub fn from_headers(retry_num: Option<&str>, retry_reason: Option<&str>) -> Self {
        Self {
            attempt: retry_num.and_then(|value| value.trim().parse().ok()),
            reason: retry_reason
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Typed admission decision produced by the classifier.
pub enum ProcessedMessage {
    Skip,
    Process { text: String, blocks: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// 200-equivalent response handed back to the host transport.
pub struct WebhookReply {
    pub body: String,
    pub content_type: &'static str,
}

impl WebhookReply {
    pub fn ok() -> Self {
        Self {
            body: "ok".to_string(),
            content_type: "text/plain",
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/plain",
        }
    }

    pub fn json(value: &Value) -> Self {
        Self {
            body: value.to_string(),
            content_type: "application/json",
        }
    }

    /// Echoes the verification token verbatim; Slack validates this
    /// byte-for-byte to complete webhook registration.
    pub fn challenge(token: &str) -> Self {
        Self::json(&json!({ "challenge": token }))
    }
}

/// Explicit per-request context. Every collaborator the core touches is
/// passed in here; there is no ambient or process-wide state, so tests
/// run against fabricated contexts.
pub struct EndpointContext<'a> {
    pub settings: &'a Settings,
    pub slack: &'a SlackClient,
    pub chat: &'a dyn ChatBackend,
    /// Primary upload path for attachment relay, when the host provides
    /// an in-process storage session.
    pub storage: Option<&'a dyn StorageSession>,
    /// Fallback upload path, present when Dify API credentials were
    /// configured.
    pub dify: Option<&'a DifyClient>,
}

#[derive(Debug, Error)]
/// Splits processing failures into the class that is re-raised to the
/// host (structured Slack API errors) and everything else, which error
/// recovery converts into an apology.
pub enum ProcessError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Entry point for one webhook delivery. Always resolves to a
/// [`WebhookReply`] the host returns with status 200, except for Slack
/// API errors raised during dispatch, which propagate so the host's own
/// reporting applies.
pub async fn handle_webhook(
    ctx: &EndpointContext<'_>,
    retry: &RetrySignal,
    payload: &Value,
) -> Result<WebhookReply> {
    if gate::should_suppress_retry(retry, ctx.settings) {
        debug!(attempt = ?retry.attempt, reason = ?retry.reason, "suppressing retried delivery");
        return Ok(WebhookReply::ok());
    }

    let envelope: WebhookEnvelope =
        serde_json::from_value(payload.clone()).context("failed to decode webhook envelope")?;

    match envelope.kind.as_str() {
        "url_verification" => Ok(WebhookReply::challenge(
            envelope.challenge.as_deref().unwrap_or_default(),
        )),
        "event_callback" => handle_event_callback(ctx, envelope.event.unwrap_or_default()).await,
        other => {
            debug!(kind = other, "ignoring unhandled envelope kind");
            Ok(WebhookReply::ok())
        }
    }
}

async fn handle_event_callback(
    ctx: &EndpointContext<'_>,
    event: ChatEvent,
) -> Result<WebhookReply> {
    if !classifier::admits_user(&event.user, ctx.settings) {
        debug!(user = %event.user, "dropping event from empty or ignored user");
        return Ok(WebhookReply::ok());
    }

    if !classifier::channel_matches(ctx.slack, ctx.settings, &event.channel).await {
        return Ok(WebhookReply::ok());
    }

    let ProcessedMessage::Process { text, blocks } = classifier::classify(&event, ctx.settings)
    else {
        return Ok(WebhookReply::ok());
    };
    if text.is_empty() {
        return Ok(WebhookReply::ok());
    }

    match process_message(ctx, &event, &text, &blocks).await {
        Ok(reply) => Ok(reply),
        Err(ProcessError::Slack(error)) => {
            warn!(method = error.method(), error = %error, "slack api error during dispatch");
            Err(error.into())
        }
        Err(ProcessError::Other(error)) => recover_from_processing_error(ctx, &event, error).await,
    }
}

async fn process_message(
    ctx: &EndpointContext<'_>,
    event: &ChatEvent,
    text: &str,
    blocks: &[Value],
) -> Result<WebhookReply, ProcessError> {
    let uploaded = relay_event_files(ctx, event).await;
    let file_summary = relay::processed_files_summary(&uploaded);

    let request = ChatInvokeRequest {
        app_id: ctx.settings.app.app_id.clone(),
        query: text.to_string(),
        files: uploaded.iter().map(UploadedFile::to_file_input).collect(),
    };
    let response = ctx
        .chat
        .invoke(request)
        .await
        .map_err(|error| anyhow::Error::new(error).context("chat invocation failed"))?;

    let mut answer = response.answer;
    if let Some(summary) = file_summary {
        answer.push_str(&summary);
    }

    let posted = composer::send_reply(ctx.slack, event, &answer, blocks).await?;
    Ok(WebhookReply::json(&posted.to_json()))
}

async fn relay_event_files(ctx: &EndpointContext<'_>, event: &ChatEvent) -> Vec<UploadedFile> {
    if !ctx.settings.process_slack_files || event.files.is_empty() {
        return Vec::new();
    }

    let mut strategies = Vec::new();
    if let Some(storage) = ctx.storage {
        strategies.push(UploadStrategy::Storage(storage));
    }
    if let Some(dify) = ctx.dify {
        strategies.push(UploadStrategy::DifyApi(dify));
    }
    relay::relay_files(ctx.slack, &strategies, &event.files).await
}

/// Outermost recovery boundary: the user gets an apology in the thread
/// they wrote in, and the platform gets a 200-equivalent acknowledgment
/// so it does not redeliver a request whose side effects already
/// happened. Only a Slack error while posting the apology itself still
/// propagates.
async fn recover_from_processing_error(
    ctx: &EndpointContext<'_>,
    event: &ChatEvent,
    error: anyhow::Error,
) -> Result<WebhookReply> {
    warn!(channel = %event.channel, error = %format!("{error:#}"), "recovering from processing failure");

    let detail = truncate_for_error(&format!("{error:#}"), 600);
    let body = format!("{APOLOGY_TEXT}\n\n{detail}");
    ctx.slack
        .post_message(&event.channel, &body, Some(event.reply_thread_ts()), None)
        .await
        .context("failed to post apology message")?;

    Ok(WebhookReply::text(body))
}
