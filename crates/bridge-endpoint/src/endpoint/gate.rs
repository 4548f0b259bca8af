//! Admission filtering for retried deliveries.

use bridge_core::Settings;

use super::RetrySignal;

/// Slack's retry reason for deliveries it redelivers after an HTTP
/// timeout on a previous attempt.
const RETRY_REASON_HTTP_TIMEOUT: &str = "http_timeout";

/// True when the delivery is a platform retry the configuration says to
/// drop. Pure filtering; no side effects.
pub(super) fn should_suppress_retry(retry: &RetrySignal, settings: &Settings) -> bool {
    if settings.allow_retry {
        return false;
    }
    retry.reason.as_deref() == Some(RETRY_REASON_HTTP_TIMEOUT)
        || retry.attempt.is_some_and(|attempt| attempt > 0)
}
