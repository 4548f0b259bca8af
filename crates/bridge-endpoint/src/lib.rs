//! Webhook endpoint core bridging Slack events to a Dify application.
//!
//! The host HTTP server decodes nothing beyond the request body and the
//! two Slack retry headers; everything else (admission, classification,
//! file relay, chat invocation, reply composition, error recovery) lives
//! behind [`handle_webhook`].

mod endpoint;

pub use endpoint::{
    handle_webhook, ChatEvent, EndpointContext, ProcessError, ProcessedMessage, RetrySignal,
    SlackFileRef, WebhookEnvelope, WebhookReply,
};
