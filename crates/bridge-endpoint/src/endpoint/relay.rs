//! Two-hop attachment relay: download from Slack, upload to Dify.

use tracing::{debug, warn};

use bridge_dify::{DifyClient, StorageSession, UploadedFile};
use bridge_slack::SlackClient;

use super::SlackFileRef;

/// One upload path, tried in declaration order with a stop-on-success
/// rule: the in-process storage session is the primary, the direct Dify
/// API the fallback.
pub(super) enum UploadStrategy<'a> {
    Storage(&'a dyn StorageSession),
    DifyApi(&'a DifyClient),
}

impl UploadStrategy<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage-session",
            Self::DifyApi(_) => "dify-api",
        }
    }

    async fn upload(
        &self,
        filename: &str,
        content: &[u8],
        mimetype: &str,
    ) -> anyhow::Result<UploadedFile> {
        match self {
            Self::Storage(session) => session.upload(filename, content, mimetype).await,
            Self::DifyApi(client) => client
                .upload_file(filename, content, mimetype)
                .await
                .map_err(Into::into),
        }
    }
}

/// Per-file relay outcome; a skip never aborts the batch.
pub(super) enum FileRelayOutcome {
    Uploaded(UploadedFile),
    Skipped { reason: String },
}

/// Relays each attachment in order. A partial result is valid: one
/// corrupt or unreachable attachment is skipped with a log line and the
/// rest are still attempted, preserving the relative order of successes.
pub(super) async fn relay_files(
    slack: &SlackClient,
    strategies: &[UploadStrategy<'_>],
    files: &[SlackFileRef],
) -> Vec<UploadedFile> {
    let mut uploaded = Vec::new();
    for file in files {
        match relay_one(slack, strategies, file).await {
            FileRelayOutcome::Uploaded(entry) => {
                debug!(name = %entry.name, id = %entry.id, "relayed attachment");
                uploaded.push(entry);
            }
            FileRelayOutcome::Skipped { reason } => {
                warn!(
                    name = file.name.as_deref().unwrap_or("<unnamed>"),
                    reason, "skipping attachment"
                );
            }
        }
    }
    uploaded
}

async fn relay_one(
    slack: &SlackClient,
    strategies: &[UploadStrategy<'_>],
    file: &SlackFileRef,
) -> FileRelayOutcome {
    let name = file.name.as_deref().filter(|name| !name.is_empty());
    let url = file
        .url_private_download
        .as_deref()
        .filter(|url| !url.is_empty());
    let (Some(name), Some(url)) = (name, url) else {
        return FileRelayOutcome::Skipped {
            reason: "missing file url or name".to_string(),
        };
    };
    let mimetype = file.mimetype.as_deref().unwrap_or("application/octet-stream");

    let content = match slack.download_file(url).await {
        Ok(bytes) => bytes,
        Err(error) => {
            return FileRelayOutcome::Skipped {
                reason: format!("download failed: {error}"),
            };
        }
    };
    debug!(name, mimetype, size = content.len(), "downloaded attachment");

    if strategies.is_empty() {
        return FileRelayOutcome::Skipped {
            reason: "no upload path available".to_string(),
        };
    }

    let mut failures = Vec::new();
    for strategy in strategies {
        match strategy.upload(name, &content, mimetype).await {
            Ok(entry) => return FileRelayOutcome::Uploaded(entry),
            Err(error) => {
                warn!(strategy = strategy.label(), name, error = %format!("{error:#}"), "upload attempt failed");
                failures.push(format!("{}: {error:#}", strategy.label()));
            }
        }
    }

    FileRelayOutcome::Skipped {
        reason: format!("all upload paths failed ({})", failures.join("; ")),
    }
}

/// Suffix appended to the answer naming the files that made it through
/// the relay.
pub(super) fn processed_files_summary(uploaded: &[UploadedFile]) -> Option<String> {
    if uploaded.is_empty() {
        return None;
    }
    let names = uploaded
        .iter()
        .map(|file| file.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("\n\nFiles processed: {names}"))
}
