//! HTTP implementation of the Dify chat and file-upload endpoints.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use bridge_core::{
    current_unix_timestamp_ms, is_retryable_status, is_retryable_transport_error,
    parse_retry_after, retry_delay, sanitize_for_path, truncate_for_error,
};

use crate::{ChatBackend, ChatInvokeRequest, ChatInvokeResponse, DifyError, FileKind, UploadedFile};

#[derive(Debug, Clone, Deserialize)]
struct DifyUploadResponse {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Clone, Debug)]
/// Client for the Dify API: blocking chat invocation plus the multipart
/// file-upload fallback path.
pub struct DifyClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
    staging_dir: PathBuf,
}

impl DifyClient {
    pub fn new(
        api_base: String,
        api_key: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self, DifyError> {
        if api_key.trim().is_empty() {
            return Err(DifyError::MissingApiKey);
        }
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
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
            staging_dir: std::env::temp_dir(),
        })
    }

    /// Overrides where upload bytes are staged before the multipart POST.
    pub fn with_staging_dir(mut self, staging_dir: PathBuf) -> Self {
        self.staging_dir = staging_dir;
        self
    }

    /// Uploads a file through `/files/upload`, staging the bytes in an
    /// ephemeral file that is removed again on every path.
    pub async fn upload_file(
        &self,
        filename: &str,
        content: &[u8],
        mimetype: &str,
    ) -> Result<UploadedFile, DifyError> {
        let staging_path = self.staging_dir.join(format!(
            "dify-upload-{}-{}-{}",
            std::process::id(),
            current_unix_timestamp_ms(),
            sanitize_for_path(filename)
        ));
        tokio::fs::write(&staging_path, content).await?;

        let result = self.upload_staged(&staging_path, filename, mimetype).await;

        // The staged file is removed regardless of the upload outcome.
        let _ = tokio::fs::remove_file(&staging_path).await;
        result
    }

    async fn upload_staged(
        &self,
        staging_path: &Path,
        filename: &str,
        mimetype: &str,
    ) -> Result<UploadedFile, DifyError> {
        let content = tokio::fs::read(staging_path).await?;
        let content_len = content.len() as u64;
        debug!(
            filename,
            mimetype,
            size = content_len,
            "uploading file to dify"
        );

        let part = reqwest::multipart::Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(mimetype)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/files/upload", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(DifyError::HttpStatus {
                status,
                body: truncate_for_error(&body, 800),
            });
        }

        let parsed: DifyUploadResponse = response.json().await?;
        let id = parsed
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DifyError::InvalidResponse("file upload missing id".to_string()))?;

        Ok(UploadedFile {
            id,
            name: parsed.name.unwrap_or_else(|| filename.to_string()),
            kind: FileKind::from_mime(mimetype),
            size: parsed.size.unwrap_or(content_len),
            extension: parsed.extension.unwrap_or_default(),
            mime_type: parsed.mime_type.unwrap_or_else(|| mimetype.to_string()),
            url: parsed.url.unwrap_or_default(),
        })
    }

    async fn post_chat_message(&self, payload: &Value) -> Result<ChatInvokeResponse, DifyError> {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = self
                .http
                .post(format!("{}/chat-messages", self.api_base))
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<ChatInvokeResponse>().await?);
                    }
                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(DifyError::HttpStatus {
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error.into());
                }
            }
        }
    }
}

#[async_trait]
impl ChatBackend for DifyClient {
    async fn invoke(&self, request: ChatInvokeRequest) -> Result<ChatInvokeResponse, DifyError> {
        let inputs = if request.files.is_empty() {
            json!({})
        } else {
            json!({ "files": request.files })
        };
        let payload = json!({
            "app_id": request.app_id,
            "query": request.query,
            "inputs": inputs,
            "response_mode": "blocking",
        });
        self.post_chat_message(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatBackend, ChatInvokeRequest, DifyClient, DifyError, FileKind};
    use crate::FileInput;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_client(base_url: &str) -> DifyClient {
        DifyClient::new(base_url.to_string(), "app-key".to_string(), 2_000, 3, 1)
            .expect("dify client")
    }

    #[test]
    fn unit_new_rejects_blank_api_key() {
        let error = DifyClient::new("http://api.local/v1".to_string(), "  ".to_string(), 1, 1, 1)
            .expect_err("expected missing key error");
        assert!(matches!(error, DifyError::MissingApiKey));
    }

    #[tokio::test]
    async fn functional_invoke_posts_blocking_chat_message() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST)
                .path("/chat-messages")
                .header("authorization", "Bearer app-key")
                .body_includes("\"response_mode\":\"blocking\"")
                .body_includes("\"query\":\"hello\"");
            then.status(200)
                .json_body(json!({"answer": "hi there", "conversation_id": "conv-1"}));
        });

        let response = test_client(&server.base_url())
            .invoke(ChatInvokeRequest {
                app_id: "app-42".to_string(),
                query: "hello".to_string(),
                files: Vec::new(),
            })
            .await
            .expect("invoke");
        assert_eq!(response.answer, "hi there");
        assert_eq!(response.conversation_id.as_deref(), Some("conv-1"));
        chat.assert();
    }

    #[tokio::test]
    async fn functional_invoke_carries_file_references() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST)
                .path("/chat-messages")
                .body_includes("\"upload_file_id\":\"file-1\"")
                .body_includes("\"transfer_method\":\"local_file\"");
            then.status(200).json_body(json!({"answer": "ok"}));
        });

        test_client(&server.base_url())
            .invoke(ChatInvokeRequest {
                app_id: "app-42".to_string(),
                query: "describe this".to_string(),
                files: vec![FileInput {
                    upload_file_id: "file-1".to_string(),
                    kind: FileKind::Image,
                    transfer_method: "local_file".to_string(),
                }],
            })
            .await
            .expect("invoke");
        chat.assert();
    }

    #[tokio::test]
    async fn unit_invoke_surfaces_non_success_status_after_retries() {
        let server = MockServer::start();
        let chat = server.mock(|when, then| {
            when.method(POST).path("/chat-messages");
            then.status(500).body("workflow exploded");
        });

        let error = test_client(&server.base_url())
            .invoke(ChatInvokeRequest {
                app_id: "app-42".to_string(),
                query: "hello".to_string(),
                files: Vec::new(),
            })
            .await
            .expect_err("expected status error");
        match error {
            DifyError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("workflow exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Retried up to the configured attempt cap before giving up.
        assert_eq!(chat.calls(), 3);
    }

    #[tokio::test]
    async fn functional_upload_file_maps_response_and_cleans_staging() {
        let server = MockServer::start();
        let upload = server.mock(|when, then| {
            when.method(POST)
                .path("/files/upload")
                .header("authorization", "Bearer app-key");
            then.status(201).json_body(json!({
                "id": "file-9",
                "name": "diagram.png",
                "size": 512,
                "extension": "png",
                "mime_type": "image/png",
                "url": "/files/file-9"
            }));
        });

        let staging = tempdir().expect("tempdir");
        let uploaded = test_client(&server.base_url())
            .with_staging_dir(staging.path().to_path_buf())
            .upload_file("diagram.png", b"png-bytes", "image/png")
            .await
            .expect("upload");
        assert_eq!(uploaded.id, "file-9");
        assert_eq!(uploaded.kind, FileKind::Image);
        assert_eq!(uploaded.size, 512);
        assert_eq!(uploaded.url, "/files/file-9");
        upload.assert();

        let staged = std::fs::read_dir(staging.path()).expect("read staging dir");
        assert_eq!(staged.count(), 0, "staging file should be removed");
    }

    #[tokio::test]
    async fn regression_upload_file_removes_staging_on_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/files/upload");
            then.status(500).body("storage offline");
        });

        let staging = tempdir().expect("tempdir");
        let error = test_client(&server.base_url())
            .with_staging_dir(staging.path().to_path_buf())
            .upload_file("diagram.png", b"png-bytes", "image/png")
            .await
            .expect_err("expected upload failure");
        match error {
            DifyError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("storage offline"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let staged = std::fs::read_dir(staging.path()).expect("read staging dir");
        assert_eq!(staged.count(), 0, "staging file should be removed on failure");
    }

    #[tokio::test]
    async fn regression_upload_file_defaults_missing_metadata() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/files/upload");
            then.status(200).json_body(json!({"id": "file-2"}));
        });

        let staging = tempdir().expect("tempdir");
        let uploaded = test_client(&server.base_url())
            .with_staging_dir(staging.path().to_path_buf())
            .upload_file("notes.txt", b"hello", "text/plain")
            .await
            .expect("upload");
        assert_eq!(uploaded.name, "notes.txt");
        assert_eq!(uploaded.size, 5);
        assert_eq!(uploaded.mime_type, "text/plain");
        assert_eq!(uploaded.kind, FileKind::Document);
    }
}
