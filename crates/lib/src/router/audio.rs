//! Audio orchestrator: text question -> spoken answer, and voice note -> spoken answer.
//!
//! Both flows hand their output artifact back inside the [`FlowOutcome`] so it lives until the
//! file has been delivered; any artifact dropped on an error path is still deleted after the grace.

use crate::artifacts::{
    ArtifactGuard, ArtifactStore, AudioFormat, LABEL_SPOKEN_REPLY, LABEL_VOICE_INPUT, LABEL_VOICE_REPLY,
};
use crate::backend::Backend;
use crate::router::error::{self, FlowError};
use crate::router::{Deliverable, FlowOutcome};
use crate::transport::{InboundMessage, Transport};

pub struct AudioOrchestrator<'a> {
    backend: &'a dyn Backend,
    artifacts: &'a ArtifactStore,
}

impl<'a> AudioOrchestrator<'a> {
    pub fn new(backend: &'a dyn Backend, artifacts: &'a ArtifactStore) -> Self {
        Self { backend, artifacts }
    }

    /// Chat, then text-to-speech, then a voice note for `chat_id`. `cleaned_text` is the classifier's
    /// output and is sent to the backend as is.
    pub async fn text_to_audio(&self, cleaned_text: &str, chat_id: &str) -> FlowOutcome {
        log::info!("router: audio reply requested for {}", chat_id);
        match self.synthesize_reply(cleaned_text, chat_id).await {
            Ok(artifact) => voice_note(chat_id, artifact),
            Err(e) => {
                log::warn!("router: audio flow for {} failed: {}", chat_id, e);
                FlowOutcome::text(chat_id, error::audio_failure(&e, false))
            }
        }
    }

    async fn synthesize_reply(&self, text: &str, chat_id: &str) -> Result<ArtifactGuard, FlowError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FlowError::EmptyCommandBody);
        }
        let reply = self.backend.chat(text, chat_id).await?;
        let reply_text = reply.text().ok_or(FlowError::EmptyReply)?;
        log::debug!(
            "router: agent reply for {}: {}",
            chat_id,
            reply_text.chars().take(50).collect::<String>()
        );
        let audio = self.backend.text_to_speech(reply_text, chat_id).await?;
        let format = AudioFormat::from_content_type(&audio.content_type);
        let artifact = self
            .artifacts
            .persist(&audio.bytes, format, LABEL_SPOKEN_REPLY, chat_id)
            .await?;
        log::info!("router: audio generated at {}", artifact.path().display());
        Ok(artifact)
    }

    /// Voice note in, voice note out. The downloaded input is deleted as soon as it has been submitted.
    pub async fn voice_reply(
        &self,
        transport: &dyn Transport,
        msg: &InboundMessage,
        chat_id: &str,
    ) -> FlowOutcome {
        log::info!("router: voice note {} from {}", msg.id, msg.sender_id);
        match self.answer_voice(transport, msg, chat_id).await {
            Ok(artifact) => voice_note(chat_id, artifact),
            Err(e) => {
                log::warn!("router: voice flow for {} failed: {}", chat_id, e);
                FlowOutcome::text(chat_id, error::audio_failure(&e, true))
            }
        }
    }

    async fn answer_voice(
        &self,
        transport: &dyn Transport,
        msg: &InboundMessage,
        chat_id: &str,
    ) -> Result<ArtifactGuard, FlowError> {
        let media = transport
            .download_media(&msg.id)
            .await
            .map_err(FlowError::Media)?;
        let input = self
            .artifacts
            .persist(&media, AudioFormat::Ogg, LABEL_VOICE_INPUT, chat_id)
            .await?;
        let answer = self.backend.audio_chat(input.path(), &msg.sender_id).await;
        input.discard().await;
        let audio = answer?;
        let format = AudioFormat::from_content_type(&audio.content_type);
        Ok(self
            .artifacts
            .persist(&audio.bytes, format, LABEL_VOICE_REPLY, chat_id)
            .await?)
    }
}

fn voice_note(chat_id: &str, artifact: ArtifactGuard) -> FlowOutcome {
    FlowOutcome {
        deliverables: vec![Deliverable::File {
            chat_id: chat_id.to_string(),
            path: artifact.path().to_path_buf(),
            as_voice: true,
            caption: None,
        }],
        artifacts: vec![artifact],
    }
}
