//! Raybridge core library: command routing between a messaging bridge and an inference backend,
//! plus the gateway, artifact store and startup health monitor used by the CLI.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod gateway;
pub mod health;
pub mod init;
pub mod router;
pub mod transport;
