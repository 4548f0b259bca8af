//! Dify service client: blocking chat invocation and file uploads.

mod client;
mod types;

pub use client::DifyClient;
pub use types::{
    ChatBackend, ChatInvokeRequest, ChatInvokeResponse, DifyError, FileInput, FileKind,
    StorageSession, UploadedFile,
};
