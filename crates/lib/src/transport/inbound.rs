//! Inbound events from the transport: readiness, auth failures and chat messages.

/// What kind of chat message arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Voice,
    /// Status/story updates, never answered.
    Status,
}

/// One chat message as seen by the router. Immutable per event.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Transport message id (used to download voice media).
    pub id: String,
    pub body: String,
    pub sender_id: String,
    pub recipient_id: String,
    /// True when the paired account wrote the message itself (from another device).
    pub is_self_sent: bool,
    pub kind: MessageKind,
}

impl InboundMessage {
    /// The chat a reply goes to: the recipient for self-sent messages, otherwise the sender.
    pub fn reply_target(&self) -> &str {
        if self.is_self_sent {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }
}

/// Events the transport emits.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Ready,
    AuthFailure { reason: String },
    Disconnected { reason: String },
    Message(InboundMessage),
}
