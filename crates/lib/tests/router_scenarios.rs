//! End-to-end router flows against in-process fakes of the backend and the transport.

use async_trait::async_trait;
use raybridge::artifacts::ArtifactStore;
use raybridge::backend::{Backend, BackendError, ChatReply, HealthStatus, SpeechAudio};
use raybridge::config::RouterConfig;
use raybridge::health::RetryPolicy;
use raybridge::router::audio::AudioOrchestrator;
use raybridge::router::error::{ACK_TEXT, ATTACHMENT_FAILED, BUSY, PONG, USAGE_HINT};
use raybridge::router::{Deliverable, Router};
use raybridge::transport::{InboundMessage, MessageKind, Transport, TransportEvent};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SENDER: &str = "5215550001@c.us";
const ACCOUNT: &str = "5215550002@c.us";
const GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Health,
    Chat { text: String, user_id: String },
    Tts { text: String, user_id: String },
    AudioChat { user_id: String, input_existed: bool },
}

enum Speech {
    Audio(Vec<u8>, &'static str),
    ServerError,
}

/// Scripted backend. `chat: None` behaves like a chat request that timed out.
struct FakeBackend {
    chat: Option<ChatReply>,
    chat_delay: Duration,
    speech: Speech,
    healthy: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    fn replying(text: &str) -> Self {
        Self {
            chat: Some(ChatReply {
                reply_text: Some(text.to_string()),
                ..Default::default()
            }),
            chat_delay: Duration::ZERO,
            speech: Speech::Audio(vec![0xFF, 0xFB, 0x90, 0x00], "audio/mpeg"),
            healthy: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn timing_out() -> Self {
        Self {
            chat: None,
            ..Self::replying("")
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn speech(&self) -> Result<SpeechAudio, BackendError> {
        match &self.speech {
            Speech::Audio(bytes, content_type) => Ok(SpeechAudio {
                bytes: bytes.clone(),
                content_type: content_type.to_string(),
            }),
            Speech::ServerError => Err(BackendError::Rejected {
                status: 500,
                detail: "Error al generar audio".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn health(&self, _timeout: Duration) -> Result<HealthStatus, BackendError> {
        self.record(Call::Health);
        if !self.healthy {
            return Err(BackendError::Unreachable("connection refused".to_string()));
        }
        Ok(HealthStatus {
            personality: Some("amigable".to_string()),
            ..Default::default()
        })
    }

    async fn chat(&self, text: &str, user_id: &str) -> Result<ChatReply, BackendError> {
        self.record(Call::Chat {
            text: text.to_string(),
            user_id: user_id.to_string(),
        });
        if !self.chat_delay.is_zero() {
            tokio::time::sleep(self.chat_delay).await;
        }
        self.chat.clone().ok_or_else(|| {
            BackendError::Unreachable("chat request timed out after 60s".to_string())
        })
    }

    async fn text_to_speech(&self, text: &str, user_id: &str) -> Result<SpeechAudio, BackendError> {
        self.record(Call::Tts {
            text: text.to_string(),
            user_id: user_id.to_string(),
        });
        self.speech()
    }

    async fn audio_chat(&self, audio: &Path, user_id: &str) -> Result<SpeechAudio, BackendError> {
        self.record(Call::AudioChat {
            user_id: user_id.to_string(),
            input_existed: audio.exists(),
        });
        self.speech()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text {
        chat_id: String,
        body: String,
    },
    File {
        chat_id: String,
        path: PathBuf,
        as_voice: bool,
        caption: Option<String>,
        existed: bool,
    },
}

#[derive(Default)]
struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    fail_files: bool,
    /// After a file is sent, put a non-empty directory at its path so deleting it fails.
    block_cleanup: bool,
    media: Option<Vec<u8>>,
}

impl FakeTransport {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn id(&self) -> &str {
        "fake"
    }

    fn stop(&self) {}

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), String> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id: chat_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: &str,
        path: &Path,
        as_voice: bool,
        caption: Option<&str>,
    ) -> Result<(), String> {
        if self.fail_files {
            return Err("bridge returned 502".to_string());
        }
        self.sent.lock().unwrap().push(Sent::File {
            chat_id: chat_id.to_string(),
            path: path.to_path_buf(),
            as_voice,
            caption: caption.map(str::to_string),
            existed: path.exists(),
        });
        if self.block_cleanup {
            std::fs::remove_file(path).map_err(|e| e.to_string())?;
            std::fs::create_dir(path).map_err(|e| e.to_string())?;
            std::fs::write(path.join("keep"), b"x").map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn download_media(&self, _message_id: &str) -> Result<Vec<u8>, String> {
        self.media.clone().ok_or_else(|| "no media".to_string())
    }
}

struct Harness {
    router: Arc<Router>,
    backend: Arc<FakeBackend>,
    transport: Arc<FakeTransport>,
    artifacts: Arc<ArtifactStore>,
}

fn harness(backend: FakeBackend, transport: FakeTransport, options: RouterConfig) -> Harness {
    let dir = std::env::temp_dir().join(format!("raybridge-router-{}", uuid::Uuid::new_v4()));
    let backend = Arc::new(backend);
    let transport = Arc::new(transport);
    let artifacts = Arc::new(ArtifactStore::new(dir, GRACE));
    let router = Arc::new(Router::new(
        backend.clone(),
        transport.clone(),
        artifacts.clone(),
        options,
        RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
    ));
    Harness {
        router,
        backend,
        transport,
        artifacts,
    }
}

fn message(body: &str, kind: MessageKind, is_self_sent: bool) -> InboundMessage {
    InboundMessage {
        id: "wamid-1".to_string(),
        body: body.to_string(),
        sender_id: SENDER.to_string(),
        recipient_id: ACCOUNT.to_string(),
        is_self_sent,
        kind,
    }
}

fn text(body: &str) -> InboundMessage {
    message(body, MessageKind::Text, false)
}

fn sent_text(body: &str) -> Sent {
    Sent::Text {
        chat_id: SENDER.to_string(),
        body: body.to_string(),
    }
}

async fn wait_until_gone(path: &Path) {
    for _ in 0..100 {
        if !path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} still exists after 5s", path.display());
}

async fn artifacts_dir_empty(store: &ArtifactStore) -> bool {
    let Ok(mut entries) = tokio::fs::read_dir(store.dir()).await else {
        return true;
    };
    matches!(entries.next_entry().await, Ok(None))
}

#[tokio::test]
async fn ping_answers_without_backend() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/ping")).await;
    assert_eq!(h.transport.sent(), vec![sent_text(PONG)]);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn health_command_reports_personality() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/health")).await;
    assert_eq!(
        h.transport.sent(),
        vec![sent_text("✅ Servidor activo | Personalidad: amigable")]
    );
    assert_eq!(h.backend.calls(), vec![Call::Health]);
}

#[tokio::test]
async fn text_command_gets_one_text_reply() {
    let h = harness(
        FakeBackend::replying("Hola Kenneth"),
        FakeTransport::default(),
        RouterConfig::default(),
    );
    h.router
        .handle_message(text("/raymundo dile a Kenneth que es la IA"))
        .await;
    assert_eq!(h.transport.sent(), vec![sent_text("Hola Kenneth")]);
    assert_eq!(
        h.backend.calls(),
        vec![Call::Chat {
            text: "dile a Kenneth que es la IA".to_string(),
            user_id: SENDER.to_string(),
        }]
    );
}

#[tokio::test]
async fn audio_command_sends_mp3_voice_note_then_deletes_it() {
    let h = harness(
        FakeBackend::replying("Un chiste..."),
        FakeTransport::default(),
        RouterConfig::default(),
    );
    h.router
        .handle_message(text("/ray cuéntame un chiste en audio"))
        .await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1, "{:?}", sent);
    let Sent::File {
        chat_id,
        path,
        as_voice,
        caption,
        existed,
    } = &sent[0]
    else {
        panic!("expected a file, got {:?}", sent);
    };
    assert_eq!(chat_id, SENDER);
    assert!(*as_voice);
    assert!(caption.is_none());
    assert!(*existed, "artifact missing at send time");
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
    assert!(path.starts_with(h.artifacts.dir()));

    assert_eq!(
        h.backend.calls(),
        vec![
            Call::Chat {
                text: "cuéntame un chiste en audio".to_string(),
                user_id: SENDER.to_string(),
            },
            Call::Tts {
                text: "Un chiste...".to_string(),
                user_id: SENDER.to_string(),
            },
        ]
    );
    wait_until_gone(path).await;
}

#[tokio::test]
async fn bare_prefix_gets_usage_hint_without_backend() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/rai")).await;
    assert_eq!(h.transport.sent(), vec![sent_text(USAGE_HINT)]);
    assert!(h.backend.calls().is_empty());

    let orchestrator = AudioOrchestrator::new(h.backend.as_ref(), &h.artifacts);
    let outcome = orchestrator.text_to_audio("  ", SENDER).await;
    assert_eq!(outcome.deliverables, vec![Deliverable::text(SENDER, USAGE_HINT)]);
    assert!(outcome.artifacts.is_empty());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn audio_request_text_is_stripped_exactly_once() {
    let h = harness(FakeBackend::replying("listo"), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/rai /rai dilo en audio")).await;
    assert_eq!(
        h.backend.calls()[0],
        Call::Chat {
            text: "/rai dilo en audio".to_string(),
            user_id: SENDER.to_string(),
        }
    );

    let orchestrator = AudioOrchestrator::new(h.backend.as_ref(), &h.artifacts);
    let outcome = orchestrator
        .text_to_audio("/ray mándame audio", SENDER)
        .await;
    assert_eq!(
        h.backend.calls()[2],
        Call::Chat {
            text: "/ray mándame audio".to_string(),
            user_id: SENDER.to_string(),
        }
    );
    for artifact in outcome.artifacts {
        artifact.discard().await;
    }
}

#[tokio::test]
async fn chat_timeout_gives_exactly_one_error_text() {
    let h = harness(FakeBackend::timing_out(), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/raymundo hola")).await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::Text { body, .. } = &sent[0] else {
        panic!("expected text, got {:?}", sent);
    };
    assert!(body.starts_with("🚨 Ocurrió un error"), "{}", body);
    assert!(body.contains("timed out"), "{}", body);
}

#[tokio::test]
async fn audio_flow_failures_give_one_hinted_text() {
    let h = harness(FakeBackend::timing_out(), FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/ray mándame audio")).await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::Text { body, .. } = &sent[0] else {
        panic!("expected text, got {:?}", sent);
    };
    assert!(body.starts_with("⚠️  No pude generar el audio."), "{}", body);
    assert!(body.contains("no está respondiendo"), "{}", body);

    let backend = FakeBackend {
        speech: Speech::ServerError,
        ..FakeBackend::replying("hola")
    };
    let h = harness(backend, FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/ray dímelo en audio")).await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::Text { body, .. } = &sent[0] else {
        panic!("expected text, got {:?}", sent);
    };
    assert!(body.contains("dependencias de audio"), "{}", body);
    assert!(artifacts_dir_empty(&h.artifacts).await);
}

#[tokio::test]
async fn self_sent_message_replies_to_recipient() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router
        .handle_message(message("/PING", MessageKind::Text, true))
        .await;
    assert_eq!(
        h.transport.sent(),
        vec![Sent::Text {
            chat_id: ACCOUNT.to_string(),
            body: PONG.to_string(),
        }]
    );
}

#[tokio::test]
async fn status_voice_and_chatter_are_ignored_by_default() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router
        .handle_message(message("/raymundo hola", MessageKind::Status, false))
        .await;
    h.router
        .handle_message(message("", MessageKind::Voice, false))
        .await;
    h.router.handle_message(text("hola, ¿cómo estás?")).await;
    h.router.handle_message(text("   ")).await;
    assert!(h.transport.sent().is_empty());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn attachment_is_sent_with_caption_or_reported_missing() {
    let dir = std::env::temp_dir().join(format!("raybridge-attach-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let deck = dir.join("presentacion.pptx");
    std::fs::write(&deck, b"PK").unwrap();

    let backend = FakeBackend {
        chat: Some(ChatReply {
            reply_text: Some("Aquí está".to_string()),
            attachment_path: Some(deck.display().to_string()),
            attachment_label: Some("presentacion".to_string()),
        }),
        ..FakeBackend::replying("")
    };
    let h = harness(backend, FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/raymundo hazme una presentación")).await;
    assert_eq!(
        h.transport.sent(),
        vec![
            sent_text("Aquí está"),
            Sent::File {
                chat_id: SENDER.to_string(),
                path: deck.clone(),
                as_voice: false,
                caption: Some("presentacion".to_string()),
                existed: true,
            },
        ]
    );
    assert!(deck.exists(), "backend attachments are not ours to delete");

    let backend = FakeBackend {
        chat: Some(ChatReply {
            reply_text: None,
            attachment_path: Some(dir.join("gone.pdf").display().to_string()),
            attachment_label: None,
        }),
        ..FakeBackend::replying("")
    };
    let h = harness(backend, FakeTransport::default(), RouterConfig::default());
    h.router.handle_message(text("/raymundo hazme un pdf")).await;
    assert_eq!(h.transport.sent(), vec![sent_text(ATTACHMENT_FAILED)]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn failed_voice_note_send_falls_back_to_text_and_still_cleans_up() {
    let transport = FakeTransport {
        fail_files: true,
        ..Default::default()
    };
    let h = harness(FakeBackend::replying("Un chiste..."), transport, RouterConfig::default());
    h.router.handle_message(text("/ray en audio porfa")).await;
    assert_eq!(h.transport.sent(), vec![sent_text(ATTACHMENT_FAILED)]);
    for _ in 0..100 {
        if artifacts_dir_empty(&h.artifacts).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("artifact left behind after failed send");
}

#[tokio::test]
async fn voice_input_round_trip_when_enabled() {
    let transport = FakeTransport {
        media: Some(b"OggS-voice".to_vec()),
        ..Default::default()
    };
    let backend = FakeBackend {
        speech: Speech::Audio(b"RIFF....WAVE".to_vec(), "audio/wav"),
        ..FakeBackend::replying("")
    };
    let options = RouterConfig {
        voice_input: true,
        ..Default::default()
    };
    let h = harness(backend, transport, options);
    h.router
        .handle_message(message("", MessageKind::Voice, false))
        .await;

    assert_eq!(
        h.backend.calls(),
        vec![Call::AudioChat {
            user_id: SENDER.to_string(),
            input_existed: true,
        }]
    );
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::File {
        path,
        as_voice,
        existed,
        ..
    } = &sent[0]
    else {
        panic!("expected a file, got {:?}", sent);
    };
    assert!(*as_voice && *existed);
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"));
    let leftover_ogg = std::fs::read_dir(h.artifacts.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().and_then(|x| x.to_str()) == Some("ogg"));
    assert!(!leftover_ogg, "input voice note not discarded");
    wait_until_gone(path).await;
}

#[tokio::test]
async fn voice_backend_failure_gives_one_text_and_discards_input() {
    let transport = FakeTransport {
        media: Some(b"OggS-voice".to_vec()),
        ..Default::default()
    };
    let backend = FakeBackend {
        speech: Speech::ServerError,
        ..FakeBackend::replying("")
    };
    let options = RouterConfig {
        voice_input: true,
        ..Default::default()
    };
    let h = harness(backend, transport, options);
    h.router
        .handle_message(message("", MessageKind::Voice, false))
        .await;

    assert_eq!(
        h.backend.calls(),
        vec![Call::AudioChat {
            user_id: SENDER.to_string(),
            input_existed: true,
        }]
    );
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1, "{:?}", sent);
    let Sent::Text { chat_id, body } = &sent[0] else {
        panic!("expected text, got {:?}", sent);
    };
    assert_eq!(chat_id, SENDER);
    assert!(body.contains("mensaje de voz"), "{}", body);
    assert!(body.contains("dependencias de audio"), "{}", body);
    assert!(artifacts_dir_empty(&h.artifacts).await, "voice input left behind");
}

#[tokio::test]
async fn artifact_cleanup_failure_does_not_break_the_router() {
    let transport = FakeTransport {
        block_cleanup: true,
        ..Default::default()
    };
    let h = harness(FakeBackend::replying("Un chiste..."), transport, RouterConfig::default());
    h.router
        .handle_message(text("/ray cuéntame un chiste en audio"))
        .await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1, "{:?}", sent);
    let Sent::File { path, existed, .. } = &sent[0] else {
        panic!("expected a file, got {:?}", sent);
    };
    assert!(*existed);

    tokio::time::sleep(GRACE + Duration::from_millis(300)).await;
    assert!(path.is_dir(), "blocked path should survive the failed delete");

    h.router.handle_message(text("/ping")).await;
    assert_eq!(h.transport.sent().last(), Some(&sent_text(PONG)));
    let _ = std::fs::remove_dir_all(h.artifacts.dir());
}

#[tokio::test]
async fn voice_download_failure_gives_one_text() {
    let options = RouterConfig {
        voice_input: true,
        ..Default::default()
    };
    let h = harness(FakeBackend::replying(""), FakeTransport::default(), options);
    h.router
        .handle_message(message("", MessageKind::Voice, false))
        .await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let Sent::Text { body, .. } = &sent[0] else {
        panic!("expected text, got {:?}", sent);
    };
    assert!(body.contains("mensaje de voz"), "{}", body);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn single_flight_rejects_second_command_from_same_chat() {
    let backend = FakeBackend {
        chat_delay: Duration::from_millis(200),
        ..FakeBackend::replying("listo")
    };
    let options = RouterConfig {
        single_flight: true,
        ..Default::default()
    };
    let h = harness(backend, FakeTransport::default(), options);
    tokio::join!(
        h.router.handle_message(text("/raymundo primero")),
        h.router.handle_message(text("/raymundo segundo")),
    );
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2, "{:?}", sent);
    assert!(sent.contains(&sent_text(BUSY)));
    assert!(sent.contains(&sent_text("listo")));
    assert_eq!(h.backend.calls().len(), 1);

    h.router.handle_message(text("/raymundo tercero")).await;
    assert_eq!(h.transport.sent().last(), Some(&sent_text("listo")));
}

#[tokio::test]
async fn acknowledgement_precedes_reply_when_enabled() {
    let options = RouterConfig {
        acknowledge: true,
        ..Default::default()
    };
    let h = harness(FakeBackend::replying("hola"), FakeTransport::default(), options);
    h.router.handle_message(text("/rai hola")).await;
    assert_eq!(h.transport.sent(), vec![sent_text(ACK_TEXT), sent_text("hola")]);

    h.router.handle_message(text("/ping")).await;
    assert_eq!(h.transport.sent().last(), Some(&sent_text(PONG)));
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test]
async fn ready_event_runs_health_monitor() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    let task = h
        .router
        .handle_event(TransportEvent::Ready)
        .expect("health monitor task");
    task.await.unwrap();
    assert_eq!(h.backend.calls(), vec![Call::Health]);

    let backend = FakeBackend {
        healthy: false,
        ..FakeBackend::replying("x")
    };
    let h = harness(backend, FakeTransport::default(), RouterConfig::default());
    h.router
        .handle_event(TransportEvent::Ready)
        .expect("health monitor task")
        .await
        .unwrap();
    assert_eq!(h.backend.calls(), vec![Call::Health, Call::Health, Call::Health]);

    assert!(h
        .router
        .handle_event(TransportEvent::AuthFailure {
            reason: "session expired".to_string()
        })
        .is_none());
}

#[tokio::test]
async fn message_event_is_handled_on_its_own_task() {
    let h = harness(FakeBackend::replying("x"), FakeTransport::default(), RouterConfig::default());
    h.router
        .handle_event(TransportEvent::Message(text("/ping")))
        .expect("message task")
        .await
        .unwrap();
    assert_eq!(h.transport.sent(), vec![sent_text(PONG)]);
}
