//! Inference backend contract and HTTP client.
//!
//! The router only talks to the backend through the [`Backend`] trait so flows can be
//! exercised against in-process fakes. [`BackendClient`] is the HTTP implementation.

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use client::{BackendClient, BackendTimeouts};

/// Backend call failures. Unreachable covers refused connections and timeouts; Rejected is a
/// non-2xx answer, carrying the backend's own `error` field when it sent one.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
    #[error("could not read audio for upload: {0}")]
    Upload(String),
}

impl BackendError {
    /// Short description for chat users: the backend's error field if present, else the transport error.
    pub fn detail(&self) -> &str {
        match self {
            BackendError::Unreachable(d) => d,
            BackendError::Rejected { detail, .. } => detail,
            BackendError::Decode(d) => d,
            BackendError::Upload(d) => d,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// GET /health body. Only `personality` is relied upon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn personality(&self) -> &str {
        self.personality.as_deref().unwrap_or("desconocido")
    }
}

/// POST /chat body: `respuesta`, optional `archivo` and `tipo_archivo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(rename = "respuesta", default)]
    pub reply_text: Option<String>,
    #[serde(rename = "archivo", default, skip_serializing_if = "Option::is_none")]
    pub attachment_path: Option<String>,
    #[serde(rename = "tipo_archivo", default, skip_serializing_if = "Option::is_none")]
    pub attachment_label: Option<String>,
}

impl ChatReply {
    /// Reply text when present and not blank.
    pub fn text(&self) -> Option<&str> {
        self.reply_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Binary audio returned by text-to-speech or transcribe-and-chat.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    /// Content-Type header value (empty when the backend sent none).
    pub content_type: String,
}

/// Operations the router needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// GET /health with an explicit timeout (5s at startup, 4s for the `/health` command).
    async fn health(&self, timeout: Duration) -> Result<HealthStatus, BackendError>;

    /// POST /chat.
    async fn chat(&self, text: &str, user_id: &str) -> Result<ChatReply, BackendError>;

    /// POST /audio/tts.
    async fn text_to_speech(&self, text: &str, user_id: &str) -> Result<SpeechAudio, BackendError>;

    /// POST /audio/chat: multipart upload of the audio file at `audio` plus `user_id`.
    async fn audio_chat(&self, audio: &Path, user_id: &str) -> Result<SpeechAudio, BackendError>;
}
