//! Bridge transport: HTTP API in front of the messaging client.
//!
//! Inbound events arrive either as webhook POSTs (handled by the gateway) or through the
//! `/events` long-poll loop here. Outbound text, files and media downloads are plain HTTP calls.

use crate::transport::handle::Transport;
use crate::transport::inbound::{InboundMessage, MessageKind, TransportEvent};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LONG_POLL_TIMEOUT: u64 = 30;

/// Per-request timeouts for bridge calls.
#[derive(Debug, Clone, Copy)]
pub struct BridgeTimeouts {
    pub send_text: Duration,
    pub send_file: Duration,
    pub download_media: Duration,
    pub close_session: Duration,
    /// Whole `/events` request; must exceed the long-poll window.
    pub events: Duration,
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            send_text: Duration::from_secs(30),
            send_file: Duration::from_secs(120),
            download_media: Duration::from_secs(120),
            close_session: Duration::from_secs(10),
            events: Duration::from_secs(LONG_POLL_TIMEOUT + 10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<BridgeUpdate>,
}

/// One bridge event (poll result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct BridgeUpdate {
    /// Monotonic event id; only present in poll mode.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub event: BridgeEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Ready,
    AuthFailure {
        #[serde(default)]
        reason: Option<String>,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: BridgeMessage,
    },
    /// QR codes, acks and anything else the router does not handle.
    #[serde(other)]
    Other,
}

/// Message payload as the bridge reports it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub id: String,
    #[serde(default)]
    pub body: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default)]
    pub is_status: bool,
}

impl BridgeMessage {
    pub fn kind(&self) -> MessageKind {
        if self.is_status {
            MessageKind::Status
        } else if self.typ == "ptt" || self.typ == "audio" {
            MessageKind::Voice
        } else {
            MessageKind::Text
        }
    }

    pub fn into_inbound(self) -> InboundMessage {
        let kind = self.kind();
        InboundMessage {
            id: self.id,
            body: self.body,
            sender_id: self.from,
            recipient_id: self.to,
            is_self_sent: self.from_me,
            kind,
        }
    }
}

impl BridgeUpdate {
    /// Map to a router event. `None` for events the router ignores.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self.event {
            BridgeEvent::Ready => Some(TransportEvent::Ready),
            BridgeEvent::AuthFailure { reason } => Some(TransportEvent::AuthFailure {
                reason: reason.unwrap_or_default(),
            }),
            BridgeEvent::Disconnected { reason } => Some(TransportEvent::Disconnected {
                reason: reason.unwrap_or_default(),
            }),
            BridgeEvent::Message { message } => Some(TransportEvent::Message(message.into_inbound())),
            BridgeEvent::Other => None,
        }
    }
}

/// Bridge connector: long-polls for events (poll mode) and sends replies over HTTP.
pub struct BridgeTransport {
    id: String,
    base_url: String,
    token: Option<String>,
    timeouts: BridgeTimeouts,
    running: AtomicBool,
    client: reqwest::Client,
}

impl BridgeTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_timeouts(base_url, token, BridgeTimeouts::default())
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        token: Option<String>,
        timeouts: BridgeTimeouts,
    ) -> Self {
        Self {
            id: "bridge".to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeouts,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Send with a per-request deadline, then check the status.
    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        timeout: Duration,
        what: &str,
    ) -> Result<reqwest::Response, String> {
        let res = self
            .authorized(req)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(what, timeout, e))?;
        Self::check(res, what).await
    }

    async fn check(res: reqwest::Response, what: &str) -> Result<reqwest::Response, String> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(format!("{} failed: {} {}", what, status, body))
    }

    /// Start the `/events` long-poll loop and forward events to the gateway. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, event_tx: mpsc::Sender<TransportEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("bridge: starting events long-poll loop");
        tokio::spawn(async move {
            run_events_loop(self, event_tx).await;
        })
    }

    /// GET /events (long poll). Returns (updates, next cursor).
    async fn get_events(&self, after: Option<i64>) -> Result<(Vec<BridgeUpdate>, Option<i64>), String> {
        let url = format!("{}/events?timeout={}", self.base_url, LONG_POLL_TIMEOUT);
        let url = if let Some(a) = after {
            format!("{}&after={}", url, a)
        } else {
            url
        };
        let res = self
            .send(self.client.get(&url), self.timeouts.events, "events")
            .await?;
        let data: EventsResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("events returned ok: false".to_string());
        }
        let next = data.result.iter().filter_map(|u| u.id).max().or(after);
        Ok((data.result, next))
    }
}

fn request_error(what: &str, timeout: Duration, e: reqwest::Error) -> String {
    if e.is_timeout() {
        format!("{} timed out after {}ms", what, timeout.as_millis())
    } else {
        format!("{} failed: {}", what, e)
    }
}

async fn run_events_loop(bridge: Arc<BridgeTransport>, event_tx: mpsc::Sender<TransportEvent>) {
    let mut after: Option<i64> = None;
    while bridge.running() {
        match bridge.get_events(after).await {
            Ok((updates, next)) => {
                after = next;
                for update in updates {
                    let Some(event) = update.into_event() else {
                        continue;
                    };
                    if event_tx.send(event).await.is_err() {
                        log::debug!("bridge: event channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("bridge events error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("bridge: events loop stopped");
}

#[async_trait]
impl Transport for BridgeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), String> {
        let url = format!("{}/messages/text", self.base_url);
        let payload = serde_json::json!({ "chatId": chat_id, "body": body });
        self.send(
            self.client.post(&url).json(&payload),
            self.timeouts.send_text,
            "send text",
        )
        .await?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: &str,
        path: &Path,
        as_voice: bool,
        caption: Option<&str>,
    ) -> Result<(), String> {
        let url = format!("{}/messages/file", self.base_url);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("reading {}: {}", path.display(), e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let mut form = Form::new()
            .text("chatId", chat_id.to_string())
            .text("asVoice", as_voice.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name));
        if let Some(c) = caption {
            form = form.text("caption", c.to_string());
        }
        self.send(
            self.client.post(&url).multipart(form),
            self.timeouts.send_file,
            "send file",
        )
        .await?;
        Ok(())
    }

    async fn download_media(&self, message_id: &str) -> Result<Vec<u8>, String> {
        let url = format!("{}/messages/{}/media", self.base_url, message_id);
        let res = self
            .send(
                self.client.get(&url),
                self.timeouts.download_media,
                "download media",
            )
            .await?;
        let bytes = res
            .bytes()
            .await
            .map_err(|e| request_error("download media", self.timeouts.download_media, e))?;
        if bytes.is_empty() {
            return Err("download media returned no data".to_string());
        }
        Ok(bytes.to_vec())
    }

    async fn shutdown(&self) -> Result<(), String> {
        let url = format!("{}/session/close", self.base_url);
        self.send(
            self.client.post(&url),
            self.timeouts.close_session,
            "close session",
        )
        .await?;
        Ok(())
    }
}
