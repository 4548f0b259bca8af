//! Shared configuration and helper surface for the Slack bridge crates.

pub mod retry;
pub mod settings;
pub mod text;
pub mod time_utils;

pub use retry::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
};
pub use settings::{AppRef, EventTypePolicy, Settings};
pub use text::{sanitize_for_path, truncate_for_error};
pub use time_utils::current_unix_timestamp_ms;
