//! Flow failures and the chat text each one turns into.

use crate::artifacts::ArtifactError;
use crate::backend::BackendError;
use std::path::PathBuf;

/// Why a flow stopped early. Every variant becomes exactly one text reply.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("attachment not found: {0}")]
    AttachmentMissing(PathBuf),
    #[error("command has no message text")]
    EmptyCommandBody,
    #[error("backend returned no reply text")]
    EmptyReply,
    #[error("could not fetch voice note: {0}")]
    Media(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

pub const PONG: &str = "🏓 Pong!";
pub const USAGE_HINT: &str =
    "⚠️  Debes proporcionar un mensaje\n\nEjemplo: /raymundo dile a Kenneth en un audio que es la IA";
pub const ACK_TEXT: &str = "🤖 Procesando tu mensaje, dame un momento...";
pub const ACK_AUDIO: &str = "🎙️ Procesando y generando respuesta en audio...";
pub const ACK_VOICE: &str = "🎙️ Procesando tu mensaje de voz...";
pub const BUSY: &str = "⏳ Sigo trabajando en tu mensaje anterior, espera un momento.";
pub const ATTACHMENT_FAILED: &str = "⚠️  No pude enviar el archivo generado, revisa el servidor.";
pub const HEALTH_DOWN: &str = "⚠️  No pude contactar al servidor.";

pub fn health_ok(personality: &str) -> String {
    format!("✅ Servidor activo | Personalidad: {}", personality)
}

/// Text-flow failure: generic phrase plus the backend's error field or the transport error.
pub fn text_failure(err: &FlowError) -> String {
    match err {
        FlowError::EmptyCommandBody => USAGE_HINT.to_string(),
        FlowError::AttachmentMissing(_) => ATTACHMENT_FAILED.to_string(),
        FlowError::Backend(e) => format!("🚨 Ocurrió un error: {}", e.detail()),
        other => format!("🚨 Ocurrió un error: {}", other),
    }
}

/// Audio-flow failure: fixed phrase plus a hint when the cause is recognizable.
pub fn audio_failure(err: &FlowError, voice_input: bool) -> String {
    match err {
        FlowError::EmptyCommandBody => return USAGE_HINT.to_string(),
        FlowError::EmptyReply => return "⚠️  No pude obtener una respuesta del agente.".to_string(),
        _ => {}
    }
    let mut msg = if voice_input {
        "⚠️  Ocurrió un error procesando tu mensaje de voz.".to_string()
    } else {
        "⚠️  No pude generar el audio.".to_string()
    };
    match err {
        FlowError::Backend(e) if e.status() == Some(500) => {
            msg.push_str("\n\n💡 Asegúrate de que las dependencias de audio están instaladas en el servidor.");
        }
        FlowError::Backend(BackendError::Unreachable(detail)) => {
            msg.push_str("\n\n💡 El servidor no está respondiendo (");
            msg.push_str(detail);
            msg.push(')');
        }
        FlowError::Media(_) => {
            msg.push_str("\n\n💡 No pude descargar el audio.");
        }
        _ => {}
    }
    msg
}
