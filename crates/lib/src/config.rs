//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.raybridge/config.json`) and environment.
//! Every field has a default so an empty `{}` file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings (health endpoint and transport webhook).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inference backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Messaging bridge settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Temporary audio artifacts.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Per-message routing options.
    #[serde(default)]
    pub router: RouterConfig,

    /// Startup health probe.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Backend base URL. Overridden by RAIMUNDO_API_URL env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub url: Option<String>,
}

/// How inbound events reach the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// The bridge POSTs events to `/transport/webhook`.
    #[default]
    Webhook,
    /// The gateway long-polls the bridge's `/events` endpoint.
    Poll,
}

/// Messaging bridge config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Base URL of the bridge HTTP API (e.g. "http://127.0.0.1:3010"). Required to run the gateway.
    pub bridge_url: Option<String>,
    /// Bearer token for the bridge API. Overridden by RAYBRIDGE_BRIDGE_TOKEN env.
    pub token: Option<String>,
    #[serde(default)]
    pub mode: TransportMode,
    /// Shared secret the bridge sends in X-Bridge-Secret. Overridden by RAYBRIDGE_WEBHOOK_SECRET env.
    pub webhook_secret: Option<String>,
}

/// Where temporary audio files live and how long they outlive their last use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactsConfig {
    /// Directory for temporary audio (default: `tmp` next to the config file).
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_grace_secs() -> u64 {
    5
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            grace_secs: default_grace_secs(),
        }
    }
}

impl ArtifactsConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Routing options. All default to off.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Send a short "processing" text before calling the backend.
    #[serde(default)]
    pub acknowledge: bool,
    /// Route voice notes to the transcribe-and-chat flow instead of ignoring them.
    #[serde(default)]
    pub voice_input: bool,
    /// Reject a second command from a chat while one is still running.
    #[serde(default)]
    pub single_flight: bool,
}

/// Startup health probe: attempts, spacing and per-attempt timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    #[serde(default = "default_health_attempts")]
    pub attempts: u32,
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_health_attempts() -> u32 {
    3
}

fn default_health_interval_secs() -> u64 {
    3
}

fn default_health_timeout_secs() -> u64 {
    5
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            attempts: default_health_attempts(),
            interval_secs: default_health_interval_secs(),
            timeout_secs: default_health_timeout_secs(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the backend base URL: env RAIMUNDO_API_URL overrides config; falls back to the default.
pub fn resolve_backend_url(config: &Config) -> String {
    non_empty_env("RAIMUNDO_API_URL")
        .or_else(|| non_empty(config.backend.url.as_ref()))
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
}

/// Resolve the bridge token: env RAYBRIDGE_BRIDGE_TOKEN overrides config.
pub fn resolve_bridge_token(config: &Config) -> Option<String> {
    non_empty_env("RAYBRIDGE_BRIDGE_TOKEN").or_else(|| non_empty(config.transport.token.as_ref()))
}

/// Resolve the webhook secret: env RAYBRIDGE_WEBHOOK_SECRET overrides config.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    non_empty_env("RAYBRIDGE_WEBHOOK_SECRET")
        .or_else(|| non_empty(config.transport.webhook_secret.as_ref()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RAYBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".raybridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the artifacts directory: `artifacts.directory` if set (relative paths resolved against the
/// config file's parent), otherwise the `tmp` subdirectory of the config directory.
pub fn resolve_artifacts_dir(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.artifacts.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                parent.join(d)
            }
        }
        _ => parent.join("tmp"),
    }
}

/// True when the bind address only accepts local connections.
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Load config from the given path (or the default path). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
