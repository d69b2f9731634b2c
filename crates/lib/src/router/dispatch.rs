//! Response dispatcher: trivial commands and the text flow (chat -> text and/or attachment).

use crate::backend::{Backend, ChatReply};
use crate::router::classify::TrivialCommand;
use crate::router::error::{self, FlowError};
use crate::router::Deliverable;
use std::path::PathBuf;
use std::time::Duration;

/// Timeout for the `/health` chat command (shorter than the startup probe).
const HEALTH_COMMAND_TIMEOUT: Duration = Duration::from_secs(4);

/// Answer `/ping` locally and `/health` with a backend probe.
pub async fn trivial(backend: &dyn Backend, command: TrivialCommand, chat_id: &str) -> Deliverable {
    match command {
        TrivialCommand::Ping => Deliverable::text(chat_id, error::PONG),
        TrivialCommand::Health => match backend.health(HEALTH_COMMAND_TIMEOUT).await {
            Ok(status) => Deliverable::text(chat_id, error::health_ok(status.personality())),
            Err(e) => {
                log::warn!("router: /health probe failed: {}", e);
                Deliverable::text(chat_id, error::HEALTH_DOWN)
            }
        },
    }
}

/// Text flow: ask the backend and turn the answer into deliverables. Never fails; errors become one text.
pub async fn text_reply(
    backend: &dyn Backend,
    cleaned_text: &str,
    user_id: &str,
    chat_id: &str,
) -> Vec<Deliverable> {
    match ask(backend, cleaned_text, user_id).await {
        Ok(reply) => reply_deliverables(reply, chat_id).await,
        Err(e) => {
            log::warn!("router: text flow for {} failed: {}", chat_id, e);
            vec![Deliverable::text(chat_id, error::text_failure(&e))]
        }
    }
}

async fn ask(backend: &dyn Backend, cleaned_text: &str, user_id: &str) -> Result<ChatReply, FlowError> {
    if cleaned_text.trim().is_empty() {
        return Err(FlowError::EmptyCommandBody);
    }
    Ok(backend.chat(cleaned_text, user_id).await?)
}

async fn reply_deliverables(reply: ChatReply, chat_id: &str) -> Vec<Deliverable> {
    let mut out = Vec::new();
    if let Some(text) = reply.text() {
        out.push(Deliverable::text(chat_id, text));
    }
    if let Some(path) = reply.attachment_path.as_deref().filter(|p| !p.trim().is_empty()) {
        let path = PathBuf::from(path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            out.push(Deliverable::File {
                chat_id: chat_id.to_string(),
                path,
                as_voice: false,
                caption: reply.attachment_label.clone(),
            });
        } else {
            let e = FlowError::AttachmentMissing(path);
            log::warn!("router: {}", e);
            out.push(Deliverable::text(chat_id, error::text_failure(&e)));
        }
    }
    if out.is_empty() {
        log::debug!("router: backend reply for {} had neither text nor attachment", chat_id);
    }
    out
}
