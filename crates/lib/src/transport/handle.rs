//! Transport handle: the outbound side the router delivers through.

use async_trait::async_trait;
use std::path::Path;

/// Handle to a running messaging transport (send text/files, fetch media, stop).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport id (e.g. "bridge").
    fn id(&self) -> &str;

    /// Stop receiving events. Does not wait for anything.
    fn stop(&self);

    /// Send a text message to a chat.
    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), String>;

    /// Send a file to a chat, optionally as a voice note, with an optional caption.
    async fn send_file(
        &self,
        chat_id: &str,
        path: &Path,
        as_voice: bool,
        caption: Option<&str>,
    ) -> Result<(), String>;

    /// Download the media attached to a message (voice notes). Default returns error.
    async fn download_media(&self, _message_id: &str) -> Result<Vec<u8>, String> {
        Err("media download not implemented".to_string())
    }

    /// Release the transport session. Awaited during shutdown.
    async fn shutdown(&self) -> Result<(), String> {
        Ok(())
    }
}
