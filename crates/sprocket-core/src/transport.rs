//! Chat transport collaborator contract.
//!
//! Message delivery and the platform wire protocol live outside this crate.
//! The core only needs to download attachments, edit status messages and
//! delete messages, so that is all the trait exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The edit would not change the message text.
    ///
    /// Platforms reject no-op edits; callers that edit in a loop treat this
    /// as success.
    #[error("message not modified")]
    NotModified,

    /// The referenced message or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Download failed.
    #[error("download failed: {0}")]
    Download(String),

    /// Any other delivery failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Reference to a message in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Chat the message belongs to.
    pub chat_id: i64,
    /// Message id within the chat.
    pub message_id: i64,
}

impl MessageRef {
    /// Creates a new message reference.
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self { chat_id, message_id }
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Opaque transport reference used to download the file.
    pub reference: String,
    /// File name as declared by the sender, if any.
    pub file_name: Option<String>,
    /// Declared MIME type, if any.
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Creates an attachment with the given reference and no metadata.
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into(), file_name: None, mime_type: None }
    }

    /// Sets the declared file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Sets the declared MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Transport operations consumed by the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Downloads the bytes of an attachment.
    async fn download_attachment(&self, attachment: &Attachment) -> TransportResult<Vec<u8>>;

    /// Replaces the text of a status message.
    async fn edit_status_message(&self, message: &MessageRef, text: &str) -> TransportResult<()>;

    /// Deletes a message.
    async fn delete_message(&self, message: &MessageRef) -> TransportResult<()>;
}
