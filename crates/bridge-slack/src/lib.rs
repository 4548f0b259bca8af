//! Slack Web API client used by the webhook bridge.

mod client;
mod error;

pub use client::{SlackChannelInfo, SlackClient, SlackPostedMessage};
pub use error::SlackApiError;
