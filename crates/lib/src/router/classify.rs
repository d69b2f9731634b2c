//! Command classifier: message body + kind -> what to do with it. Pure and total.

use crate::transport::MessageKind;

/// Content-command prefixes, checked in this order (so `/raymundo` wins over `/ray`).
pub const COMMAND_PREFIXES: [&str; 6] = ["/raymundo", "/rai", "/amigable", "/puteado", "/ray", "/putedo"];

/// Phrases that ask for a voice reply. Matched as lower-case substrings.
pub const AUDIO_PHRASES: [&str; 22] = [
    "en un audio",
    "en audio",
    "con un audio",
    "con audio",
    "manda un audio",
    "manda audio",
    "envia un audio",
    "envía un audio",
    "envia audio",
    "envía audio",
    "responde con audio",
    "responde en audio",
    "contestame con audio",
    "contéstame con audio",
    "contestame en audio",
    "contéstame en audio",
    "hazme un audio",
    "házmelo en audio",
    "mandame audio",
    "mándame audio",
    "grabame un audio",
    "grábame un audio",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Status,
    VoiceNotSupported,
    Empty,
    NoCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrivialCommand {
    Ping,
    Health,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignored { reason: IgnoreReason },
    Trivial { command: TrivialCommand },
    Content { cleaned_text: String, wants_audio: bool },
}

fn starts_with_ignore_ascii_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Strip the first matching command prefix and surrounding whitespace. `None` when no prefix matches.
/// Casing of the remaining text is preserved.
pub fn strip_command_prefix(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    COMMAND_PREFIXES
        .iter()
        .find(|p| starts_with_ignore_ascii_case(trimmed, p))
        .map(|p| trimmed[p.len()..].trim())
}

/// True when the text asks for an audio reply anywhere, ignoring case.
pub fn wants_audio(text: &str) -> bool {
    let lower = text.to_lowercase();
    AUDIO_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn classify(body: &str, kind: MessageKind) -> Classification {
    match kind {
        MessageKind::Status => {
            return Classification::Ignored {
                reason: IgnoreReason::Status,
            }
        }
        MessageKind::Voice => {
            return Classification::Ignored {
                reason: IgnoreReason::VoiceNotSupported,
            }
        }
        MessageKind::Text => {}
    }
    let lower = body.trim().to_lowercase();
    if lower.is_empty() {
        return Classification::Ignored {
            reason: IgnoreReason::Empty,
        };
    }
    match lower.as_str() {
        "/ping" => {
            return Classification::Trivial {
                command: TrivialCommand::Ping,
            }
        }
        "/health" => {
            return Classification::Trivial {
                command: TrivialCommand::Health,
            }
        }
        _ => {}
    }
    match strip_command_prefix(body) {
        Some(cleaned) => Classification::Content {
            wants_audio: wants_audio(cleaned),
            cleaned_text: cleaned.to_string(),
        },
        None => Classification::Ignored {
            reason: IgnoreReason::NoCommand,
        },
    }
}
