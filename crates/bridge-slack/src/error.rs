//! Typed Slack API failures.
//!
//! The dispatch layer treats every `SlackApiError` as the class that is
//! re-raised to the host instead of being converted into an apology
//! message, so the variants here stay distinct from generic processing
//! failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlackApiError {
    /// Slack answered with `ok: false` and a structured error code.
    #[error("slack {method} failed: {code}")]
    Api { method: String, code: String },
    /// Slack answered with a non-success HTTP status after retries.
    #[error("slack {method} failed with status {status}: {body}")]
    HttpStatus {
        method: String,
        status: u16,
        body: String,
    },
    /// The request never produced a usable response.
    #[error("slack {method} request failed")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode slack {method} response")]
    Decode {
        method: String,
        #[source]
        source: reqwest::Error,
    },
}

impl SlackApiError {
    /// Slack API method name the failure belongs to.
    pub fn method(&self) -> &str {
        match self {
            Self::Api { method, .. }
            | Self::HttpStatus { method, .. }
            | Self::Http { method, .. }
            | Self::Decode { method, .. } => method,
        }
    }
}
