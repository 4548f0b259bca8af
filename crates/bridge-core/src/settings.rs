//! Host-supplied settings for the Slack webhook bridge.

use serde::Deserialize;

const DEFAULT_DIFY_BASE_URL: &str = "http://api:5001/v1";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
/// Reference to the Dify application the bridge forwards queries to.
pub struct AppRef {
    #[serde(default)]
    pub app_id: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Which Slack event kinds the bridge is willing to process.
pub enum EventTypePolicy {
    #[default]
    AppMention,
    Message,
    Both,
}

impl EventTypePolicy {
    pub fn allows_app_mention(self) -> bool {
        matches!(self, Self::AppMention | Self::Both)
    }

    pub fn allows_message(self) -> bool {
        matches!(self, Self::Message | Self::Both)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
/// Per-request configuration supplied by the host. Read-only once built;
/// every field carries a serde default so partial configs load.
pub struct Settings {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub app: AppRef,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub event_types: EventTypePolicy,
    /// Comma-separated Slack user ids to ignore. Kept in wire form; use
    /// [`Settings::ignores_user`] to consult it.
    #[serde(default)]
    pub ignore_user_ids: String,
    #[serde(default)]
    pub allow_retry: bool,
    #[serde(default)]
    pub process_slack_files: bool,
    #[serde(default)]
    pub dify_api_key: Option<String>,
    #[serde(default = "default_dify_base_url")]
    pub dify_base_url: String,
}

fn default_dify_base_url() -> String {
    DEFAULT_DIFY_BASE_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app: AppRef::default(),
            channel_name: None,
            event_types: EventTypePolicy::default(),
            ignore_user_ids: String::new(),
            allow_retry: false,
            process_slack_files: false,
            dify_api_key: None,
            dify_base_url: default_dify_base_url(),
        }
    }
}

impl Settings {
    pub fn ignored_user_ids(&self) -> Vec<&str> {
        self.ignore_user_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    }

    pub fn ignores_user(&self, user: &str) -> bool {
        self.ignored_user_ids().contains(&user)
    }

    /// Configured channel-name filter, or `None` when every channel matches.
    pub fn configured_channel_name(&self) -> Option<&str> {
        self.channel_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Dify API credentials for the fallback upload path, when supplied.
    pub fn dify_credentials(&self) -> Option<(&str, &str)> {
        let key = self
            .dify_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;
        Some((self.dify_base_url.trim_end_matches('/'), key))
    }
}
