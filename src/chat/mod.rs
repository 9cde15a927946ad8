pub mod controller;
pub mod decoder;
pub mod framer;
pub mod session;
pub mod transport;

use serde::{Deserialize, Serialize};

const STORAGE_PREFIX: &str = "thinkback";

/// Request body for both chat endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatPayload {
    pub message: String,
}

/// One decoded `data:` event. `error` takes precedence over `text`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChunk {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Connecting,
    Streaming,
    Complete,
    Error,
}

impl StreamStatus {
    pub fn is_active(self) -> bool {
        matches!(self, StreamStatus::Connecting | StreamStatus::Streaming)
    }
}

/// Which conversation a controller is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatScope {
    Global,
    Ticket(String),
}

impl ChatScope {
    /// Storage key for this scope's history.
    pub fn storage_key(&self) -> String {
        match self {
            ChatScope::Global => format!("{STORAGE_PREFIX}_global_chat"),
            ChatScope::Ticket(id) => format!("{STORAGE_PREFIX}_ticket_chat_{id}"),
        }
    }

    /// Path of the streaming endpoint, relative to the backend base URL.
    pub fn endpoint_path(&self) -> String {
        match self {
            ChatScope::Global => "/api/chat/global/stream".to_string(),
            ChatScope::Ticket(id) => format!("/api/chat/ticket/{id}/stream"),
        }
    }

    /// Full streaming endpoint under `base_url`.
    pub fn endpoint_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.endpoint_path())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("A response is already streaming")]
    StreamInProgress,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Response body is empty")]
    MissingBody,
}
