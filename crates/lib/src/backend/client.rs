//! HTTP client for the rAImundo backend (http://127.0.0.1:5000 by default).
//! JSON for chat/health, binary bodies for the audio endpoints.

use crate::backend::{Backend, BackendError, ChatReply, HealthStatus, SpeechAudio};
use crate::config::DEFAULT_BACKEND_URL;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Per-operation request timeouts.
#[derive(Debug, Clone, Copy)]
pub struct BackendTimeouts {
    pub chat: Duration,
    pub text_to_speech: Duration,
    pub audio_chat: Duration,
    /// Housekeeping endpoints (clear history, stats, metrics reset, audio status).
    pub admin: Duration,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            chat: Duration::from_secs(60),
            text_to_speech: Duration::from_secs(60),
            audio_chat: Duration::from_secs(120),
            admin: Duration::from_secs(10),
        }
    }
}

/// Client for the backend HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    timeouts: BackendTimeouts,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self::with_timeouts(base_url, BackendTimeouts::default())
    }

    pub fn with_timeouts(base_url: Option<String>, timeouts: BackendTimeouts) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        Self {
            base_url,
            timeouts,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_error(&self, operation: &str, timeout: Duration, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Unreachable(format!(
                "{} request timed out after {}s",
                operation,
                timeout.as_secs()
            ))
        } else if e.is_connect() {
            BackendError::Unreachable(format!(
                "could not connect to {} ({})",
                self.base_url, e
            ))
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Unreachable(e.to_string())
        }
    }

    /// Send a request with a timeout; non-2xx answers become `Rejected` with the backend's error field.
    /// The backend's `details` field is diagnostic only: it is logged, never shown to chat users.
    async fn send(
        &self,
        operation: &str,
        req: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, BackendError> {
        let res = req
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.request_error(operation, timeout, e))?;
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(ErrorBody {
                error: Some(error),
                details,
            }) => {
                if let Some(details) = details {
                    log::warn!("backend: {} failed ({}): {}: {}", operation, status, error, details);
                }
                error
            }
            _ if body.trim().is_empty() => status.to_string(),
            _ => format!("{} {}", status, body.trim()),
        };
        Err(BackendError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    async fn read_audio(
        &self,
        operation: &str,
        timeout: Duration,
        res: reqwest::Response,
    ) -> Result<SpeechAudio, BackendError> {
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| self.request_error(operation, timeout, e))?;
        if bytes.is_empty() {
            return Err(BackendError::Decode(format!("{} returned no audio", operation)));
        }
        Ok(SpeechAudio {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    /// DELETE /clear_history/{user_id}: drop the backend's conversation history for a user.
    pub async fn clear_history(&self, user_id: &str) -> Result<String, BackendError> {
        let url = format!("{}/clear_history/{}", self.base_url, user_id);
        let timeout = self.timeouts.admin;
        let res = self
            .send("clear_history", self.client.delete(&url), timeout)
            .await?;
        let body: MessageBody = res
            .json()
            .await
            .map_err(|e| self.request_error("clear_history", timeout, e))?;
        Ok(body.message.unwrap_or_default())
    }

    /// POST /metrics/reset: zero the backend's usage counters. Returns the backend's message.
    pub async fn reset_metrics(&self) -> Result<String, BackendError> {
        let url = format!("{}/metrics/reset", self.base_url);
        let timeout = self.timeouts.admin;
        let res = self
            .send("reset_metrics", self.client.post(&url), timeout)
            .await?;
        let body: MessageBody = res
            .json()
            .await
            .map_err(|e| self.request_error("reset_metrics", timeout, e))?;
        Ok(body.message.unwrap_or_default())
    }

    /// GET /audio/status: which speech engines the backend has available.
    pub async fn audio_status(&self) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}/audio/status", self.base_url);
        let timeout = self.timeouts.admin;
        let res = self
            .send("audio_status", self.client.get(&url), timeout)
            .await?;
        res.json()
            .await
            .map_err(|e| self.request_error("audio_status", timeout, e))
    }

    /// GET /stats: usage counters as reported by the backend.
    pub async fn stats(&self) -> Result<serde_json::Value, BackendError> {
        let url = format!("{}/stats", self.base_url);
        let timeout = self.timeouts.admin;
        let res = self.send("stats", self.client.get(&url), timeout).await?;
        res.json()
            .await
            .map_err(|e| self.request_error("stats", timeout, e))
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn health(&self, timeout: Duration) -> Result<HealthStatus, BackendError> {
        let url = format!("{}/health", self.base_url);
        let res = self.send("health", self.client.get(&url), timeout).await?;
        res.json()
            .await
            .map_err(|e| self.request_error("health", timeout, e))
    }

    async fn chat(&self, text: &str, user_id: &str) -> Result<ChatReply, BackendError> {
        let url = format!("{}/chat", self.base_url);
        let timeout = self.timeouts.chat;
        let body = json!({ "mensaje": text, "user_id": user_id });
        let res = self
            .send("chat", self.client.post(&url).json(&body), timeout)
            .await?;
        res.json()
            .await
            .map_err(|e| self.request_error("chat", timeout, e))
    }

    async fn text_to_speech(&self, text: &str, user_id: &str) -> Result<SpeechAudio, BackendError> {
        let url = format!("{}/audio/tts", self.base_url);
        let timeout = self.timeouts.text_to_speech;
        let body = json!({ "texto": text, "user_id": user_id });
        let res = self
            .send("text-to-speech", self.client.post(&url).json(&body), timeout)
            .await?;
        self.read_audio("text-to-speech", timeout, res).await
    }

    async fn audio_chat(&self, audio: &Path, user_id: &str) -> Result<SpeechAudio, BackendError> {
        let url = format!("{}/audio/chat", self.base_url);
        let timeout = self.timeouts.audio_chat;
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| BackendError::Upload(format!("{}: {}", audio.display(), e)))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.ogg".to_string());
        let part = Part::bytes(bytes).file_name(file_name);
        let form = Form::new()
            .part("audio", part)
            .text("user_id", user_id.to_string());
        let res = self
            .send("audio chat", self.client.post(&url).multipart(form), timeout)
            .await?;
        self.read_audio("audio chat", timeout, res).await
    }
}
