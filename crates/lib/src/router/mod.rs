//! Command router: transport events in, deliverables out.
//!
//! [`Router::handle_event`] is the dispatch table over [`TransportEvent`]. Each chat message is
//! classified, runs at most one flow (trivial reply, text reply, audio reply or voice reply), and
//! its deliverables are sent to the message's reply target. Flows never fail outward: every error
//! becomes a single text.

pub mod audio;
pub mod classify;
pub mod dispatch;
pub mod error;

use crate::artifacts::{ArtifactGuard, ArtifactStore};
use crate::backend::Backend;
use crate::config::RouterConfig;
use crate::health::{self, RetryPolicy};
use crate::transport::{InboundMessage, Transport, TransportEvent};
use audio::AudioOrchestrator;
use classify::{Classification, IgnoreReason, TrivialCommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deliverable {
    Text {
        chat_id: String,
        body: String,
    },
    File {
        chat_id: String,
        path: PathBuf,
        as_voice: bool,
        caption: Option<String>,
    },
}

impl Deliverable {
    pub fn text(chat_id: &str, body: impl Into<String>) -> Self {
        Deliverable::Text {
            chat_id: chat_id.to_string(),
            body: body.into(),
        }
    }
}

/// What a flow produced: the messages to send and the artifacts that must outlive sending them.
#[derive(Debug, Default)]
pub struct FlowOutcome {
    pub deliverables: Vec<Deliverable>,
    pub artifacts: Vec<ArtifactGuard>,
}

impl FlowOutcome {
    pub fn text(chat_id: &str, body: impl Into<String>) -> Self {
        Self::from_deliverables(vec![Deliverable::text(chat_id, body)])
    }

    pub fn from_deliverables(deliverables: Vec<Deliverable>) -> Self {
        Self {
            deliverables,
            artifacts: Vec::new(),
        }
    }
}

/// What the router decided to do with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Skip(IgnoreReason),
    Trivial(TrivialCommand),
    Text(String),
    /// Spoken reply to the cleaned text.
    Audio(String),
    Voice,
}

impl Plan {
    fn ack(&self) -> Option<&'static str> {
        match self {
            Plan::Text(_) => Some(error::ACK_TEXT),
            Plan::Audio(_) => Some(error::ACK_AUDIO),
            Plan::Voice => Some(error::ACK_VOICE),
            Plan::Skip(_) | Plan::Trivial(_) => None,
        }
    }

    /// Trivial commands answer instantly and do not take the chat's single-flight slot.
    fn is_long_running(&self) -> bool {
        matches!(self, Plan::Text(_) | Plan::Audio(_) | Plan::Voice)
    }
}

/// Map a message to its flow. Voice notes only get a flow when voice input is enabled.
fn plan(msg: &InboundMessage, voice_input: bool) -> Plan {
    match classify::classify(&msg.body, msg.kind) {
        Classification::Ignored {
            reason: IgnoreReason::VoiceNotSupported,
        } if voice_input => Plan::Voice,
        Classification::Ignored { reason } => Plan::Skip(reason),
        Classification::Trivial { command } => Plan::Trivial(command),
        Classification::Content {
            cleaned_text,
            wants_audio: true,
        } => Plan::Audio(cleaned_text),
        Classification::Content { cleaned_text, .. } => Plan::Text(cleaned_text),
    }
}

/// Chats with a long-running flow in progress.
#[derive(Default)]
struct ChatGuard {
    busy: Mutex<HashSet<String>>,
}

impl ChatGuard {
    fn try_enter(self: &Arc<Self>, chat_id: &str) -> Option<ChatPermit> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(chat_id.to_string()) {
            return None;
        }
        Some(ChatPermit {
            guard: Arc::clone(self),
            chat_id: chat_id.to_string(),
        })
    }
}

struct ChatPermit {
    guard: Arc<ChatGuard>,
    chat_id: String,
}

impl Drop for ChatPermit {
    fn drop(&mut self) {
        let mut busy = self.guard.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.chat_id);
    }
}

pub struct Router {
    backend: Arc<dyn Backend>,
    transport: Arc<dyn Transport>,
    artifacts: Arc<ArtifactStore>,
    options: RouterConfig,
    health: RetryPolicy,
    in_flight: Arc<ChatGuard>,
}

impl Router {
    pub fn new(
        backend: Arc<dyn Backend>,
        transport: Arc<dyn Transport>,
        artifacts: Arc<ArtifactStore>,
        options: RouterConfig,
        health: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            transport,
            artifacts,
            options,
            health,
            in_flight: Arc::new(ChatGuard::default()),
        }
    }

    /// Dispatch one transport event. Work that outlives the call is spawned; its handle is returned.
    pub fn handle_event(self: &Arc<Self>, event: TransportEvent) -> Option<JoinHandle<()>> {
        match event {
            TransportEvent::Ready => {
                log::info!("router: transport ready, checking backend");
                let router = Arc::clone(self);
                Some(tokio::spawn(async move {
                    health::wait_for_backend(router.backend.as_ref(), &router.health).await;
                }))
            }
            TransportEvent::AuthFailure { reason } => {
                log::error!("router: transport authentication failed: {}", reason);
                None
            }
            TransportEvent::Disconnected { reason } => {
                log::warn!("router: transport disconnected: {}", reason);
                None
            }
            TransportEvent::Message(msg) => {
                let router = Arc::clone(self);
                Some(tokio::spawn(async move {
                    router.handle_message(msg).await;
                }))
            }
        }
    }

    /// Classify, run the flow and deliver its output to the reply target.
    pub async fn handle_message(&self, msg: InboundMessage) {
        let plan = plan(&msg, self.options.voice_input);
        let chat_id = msg.reply_target().to_string();
        if let Plan::Skip(reason) = &plan {
            log::debug!("router: ignoring message {} from {} ({:?})", msg.id, msg.sender_id, reason);
            return;
        }
        log::info!(
            "router: message {} from {} -> {}",
            msg.id,
            msg.sender_id,
            chat_id
        );

        let _permit = if self.options.single_flight && plan.is_long_running() {
            match self.in_flight.try_enter(&chat_id) {
                Some(permit) => Some(permit),
                None => {
                    log::info!("router: {} already has a request in flight", chat_id);
                    self.deliver(FlowOutcome::text(&chat_id, error::BUSY)).await;
                    return;
                }
            }
        } else {
            None
        };

        if self.options.acknowledge {
            if let Some(ack) = plan.ack() {
                self.deliver(FlowOutcome::text(&chat_id, ack)).await;
            }
        }

        let outcome = self.run(plan, &msg, &chat_id).await;
        self.deliver(outcome).await;
    }

    async fn run(&self, plan: Plan, msg: &InboundMessage, chat_id: &str) -> FlowOutcome {
        let orchestrator = AudioOrchestrator::new(self.backend.as_ref(), &self.artifacts);
        match plan {
            Plan::Skip(_) => FlowOutcome::default(),
            Plan::Trivial(command) => FlowOutcome::from_deliverables(vec![
                dispatch::trivial(self.backend.as_ref(), command, chat_id).await,
            ]),
            Plan::Text(cleaned_text) => FlowOutcome::from_deliverables(
                dispatch::text_reply(self.backend.as_ref(), &cleaned_text, &msg.sender_id, chat_id)
                    .await,
            ),
            Plan::Audio(cleaned_text) => orchestrator.text_to_audio(&cleaned_text, chat_id).await,
            Plan::Voice => {
                orchestrator
                    .voice_reply(self.transport.as_ref(), msg, chat_id)
                    .await
            }
        }
    }

    /// Send every deliverable, then schedule deletion of the flow's artifacts.
    async fn deliver(&self, outcome: FlowOutcome) {
        for deliverable in outcome.deliverables {
            match deliverable {
                Deliverable::Text { chat_id, body } => {
                    if let Err(e) = self.transport.send_text(&chat_id, &body).await {
                        log::warn!("router: sending text to {} failed: {}", chat_id, e);
                    }
                }
                Deliverable::File {
                    chat_id,
                    path,
                    as_voice,
                    caption,
                } => {
                    let sent = self
                        .transport
                        .send_file(&chat_id, &path, as_voice, caption.as_deref())
                        .await;
                    match sent {
                        Ok(()) => log::info!("router: sent {} to {}", path.display(), chat_id),
                        Err(e) => {
                            log::warn!("router: sending {} to {} failed: {}", path.display(), chat_id, e);
                            if let Err(e) = self.transport.send_text(&chat_id, error::ATTACHMENT_FAILED).await {
                                log::warn!("router: sending text to {} failed: {}", chat_id, e);
                            }
                        }
                    }
                }
            }
        }
        for artifact in outcome.artifacts {
            artifact.release();
        }
    }
}
