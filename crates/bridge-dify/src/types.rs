//! Shared types and trait seams for the Dify side of the bridge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates Dify client failures.
pub enum DifyError {
    #[error("missing dify api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dify returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Coarse file classification the Dify service selects handling by.
pub enum FileKind {
    Image,
    Document,
    Audio,
    Video,
    /// Foreign classification arriving in a Dify response; never produced
    /// by [`FileKind::from_mime`].
    #[serde(other)]
    Other,
}

impl FileKind {
    /// Derives the coarse kind from a MIME string. Total: any input,
    /// including empty or unrecognized strings, maps to a defined kind,
    /// with `Document` as the generic fallback.
    pub fn from_mime(mime: &str) -> Self {
        let normalized = mime.trim().to_ascii_lowercase();
        if normalized.starts_with("image/") {
            Self::Image
        } else if normalized.starts_with("audio/") {
            Self::Audio
        } else if normalized.starts_with("video/") {
            Self::Video
        } else {
            Self::Document
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A file landed in Dify storage, referenced by id rather than by bytes.
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub url: String,
}

impl UploadedFile {
    /// Input-reference shape the chat invocation consumes.
    pub fn to_file_input(&self) -> FileInput {
        FileInput {
            upload_file_id: self.id.clone(),
            kind: self.kind,
            transfer_method: "local_file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// File reference passed to the chat invocation.
pub struct FileInput {
    pub upload_file_id: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub transfer_method: String,
}

#[derive(Debug, Clone, Default)]
/// Query plus optional file references for one blocking chat invocation.
pub struct ChatInvokeRequest {
    pub app_id: String,
    pub query: String,
    pub files: Vec<FileInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatInvokeResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Synchronous chat invocation seam; the HTTP client implements it and
/// tests substitute fabricated backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn invoke(&self, request: ChatInvokeRequest) -> Result<ChatInvokeResponse, DifyError>;
}

/// In-process storage upload seam supplied by the host; the primary
/// upload path when available.
#[async_trait]
pub trait StorageSession: Send + Sync {
    async fn upload(
        &self,
        filename: &str,
        content: &[u8],
        mimetype: &str,
    ) -> anyhow::Result<UploadedFile>;
}
