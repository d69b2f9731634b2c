//! Messaging transport.
//!
//! The router sends through the [`Transport`] trait and receives [`TransportEvent`]s from the
//! gateway. [`BridgeTransport`] talks to an HTTP bridge in front of the messaging client, which
//! owns pairing and the session.

mod bridge;
mod handle;
mod inbound;

pub use bridge::{BridgeEvent, BridgeMessage, BridgeTimeouts, BridgeTransport, BridgeUpdate};
pub use handle::Transport;
pub use inbound::{InboundMessage, MessageKind, TransportEvent};
