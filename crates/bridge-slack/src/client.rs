//! HTTP client for the handful of Slack Web API calls the bridge makes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use bridge_core::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

use crate::SlackApiError;

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationsInfoResponse {
    ok: bool,
    channel: Option<SlackChannelInfo>,
    error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
/// Channel metadata returned by `conversations.info`.
pub struct SlackChannelInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    message: Value,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// Result of `chat.postMessage`, carried back to the host verbatim.
pub struct SlackPostedMessage {
    pub ok: bool,
    pub channel: String,
    pub ts: String,
    pub message: Value,
}

impl SlackPostedMessage {
    pub fn to_json(&self) -> Value {
        json!({
            "ok": self.ok,
            "channel": self.channel,
            "ts": self.ts,
            "message": self.message,
        })
    }
}

#[derive(Clone)]
/// Slack Web API client with bounded retry for rate limits and 5xx.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackClient {
    pub fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self, SlackApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("dify-slack-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|source| SlackApiError::Http {
                method: "client".to_string(),
                source,
            })?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    /// Resolves channel metadata; used by the channel-name filter.
    pub async fn channel_info(&self, channel: &str) -> Result<SlackChannelInfo, SlackApiError> {
        let response: SlackConversationsInfoResponse = self
            .request_json("conversations.info", || {
                self.http
                    .get(format!("{}/conversations.info", self.api_base))
                    .query(&[("channel", channel)])
                    .bearer_auth(&self.bot_token)
            })
            .await?;

        if !response.ok {
            return Err(api_error("conversations.info", response.error));
        }
        response.channel.ok_or_else(|| SlackApiError::Api {
            method: "conversations.info".to_string(),
            code: "missing_channel".to_string(),
        })
    }

    /// Posts a message, optionally threaded and with a block tree.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<&[Value]>,
    ) -> Result<SlackPostedMessage, SlackApiError> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }
        if let Some(blocks) = blocks {
            payload["blocks"] = Value::Array(blocks.to_vec());
        }

        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;

        if !response.ok {
            return Err(api_error("chat.postMessage", response.error));
        }

        Ok(SlackPostedMessage {
            ok: response.ok,
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response.ts.unwrap_or_default(),
            message: response.message,
        })
    }

    /// Downloads a private attachment via its `url_private_download` URL.
    pub async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackApiError> {
        self.request_bytes("file download", || {
            self.http.get(url).bearer_auth(&self.bot_token)
        })
        .await
    }

    async fn request_json<T, F>(&self, method: &str, mut builder: F) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(
                    "x-bridge-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|source| {
                            SlackApiError::Decode {
                                method: method.to_string(),
                                source,
                            }
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        debug!(method, attempt, status = status.as_u16(), "retrying slack request");
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(SlackApiError::HttpStatus {
                        method: method.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(source) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&source) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(SlackApiError::Http {
                        method: method.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn request_bytes<F>(&self, method: &str, mut builder: F) -> Result<Vec<u8>, SlackApiError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder()
                .header(
                    "x-bridge-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .bytes()
                            .await
                            .map(|bytes| bytes.to_vec())
                            .map_err(|source| SlackApiError::Http {
                                method: method.to_string(),
                                source,
                            });
                    }
                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        debug!(method, attempt, status = status.as_u16(), "retrying slack request");
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(SlackApiError::HttpStatus {
                        method: method.to_string(),
                        status: status.as_u16(),
                        body: String::new(),
                    });
                }
                Err(source) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&source) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(SlackApiError::Http {
                        method: method.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

fn api_error(method: &str, code: Option<String>) -> SlackApiError {
    SlackApiError::Api {
        method: method.to_string(),
        code: code.unwrap_or_else(|| "unknown_error".to_string()),
    }
}
