//! Gateway: HTTP server the messaging bridge talks to.
//!
//! `GET /` answers health probes; `POST /transport/webhook` accepts bridge events. Events from
//! either the webhook or the bridge's long-poll loop feed one processor task that hands them to
//! the router.

mod server;

pub use server::{run_gateway, GatewayState, WEBHOOK_SECRET_HEADER};
