//! Gateway HTTP server: health probe, transport webhook and the event processor.

use crate::artifacts::ArtifactStore;
use crate::backend::{Backend, BackendClient};
use crate::config::{self, Config, TransportMode};
use crate::health::RetryPolicy;
use crate::init;
use crate::router::Router;
use crate::transport::{BridgeTransport, BridgeUpdate, Transport, TransportEvent};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Header the bridge sends with every webhook POST when a secret is configured.
pub const WEBHOOK_SECRET_HEADER: &str = "X-Bridge-Secret";

/// How long shutdown waits for the inbound loop before aborting its pending long poll.
const TRANSPORT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct GatewayState {
    pub port: u16,
    pub backend_url: String,
    pub webhook_secret: Option<String>,
    /// Sender for transport events (webhook POSTs or the poll loop). Processor task receives.
    pub event_tx: mpsc::Sender<TransportEvent>,
}

pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path, &config)?;
    let bind = config.gateway.bind.trim().to_string();
    let webhook_secret = config::resolve_webhook_secret(&config);
    if !config::is_loopback_bind(&bind)
        && config.transport.mode == TransportMode::Webhook
        && webhook_secret.is_none()
    {
        anyhow::bail!(
            "refusing to bind gateway to {} without a webhook secret (set transport.webhookSecret or RAYBRIDGE_WEBHOOK_SECRET)",
            bind
        );
    }
    let bridge_url = config
        .transport
        .bridge_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .context("transport.bridgeUrl is not set; point it at the messaging bridge")?;

    let backend_url = config::resolve_backend_url(&config);
    let backend: Arc<dyn Backend> = Arc::new(BackendClient::new(Some(backend_url.clone())));
    let bridge = Arc::new(BridgeTransport::new(
        bridge_url,
        config::resolve_bridge_token(&config),
    ));
    let transport: Arc<dyn Transport> = bridge.clone();

    let artifacts_dir = config::resolve_artifacts_dir(&config, &config_path);
    let artifacts = Arc::new(ArtifactStore::new(artifacts_dir, config.artifacts.grace()));
    artifacts.sweep_stale().await;

    let router = Arc::new(Router::new(
        backend,
        transport.clone(),
        artifacts,
        config.router,
        RetryPolicy::from(&config.health),
    ));

    let (event_tx, mut event_rx) = mpsc::channel::<TransportEvent>(64);
    {
        let router = router.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                router.handle_event(event);
            }
        });
    }

    let mut transport_tasks = Vec::new();
    match config.transport.mode {
        TransportMode::Poll => {
            transport_tasks.push(bridge.start_inbound(event_tx.clone()));
            log::info!("bridge transport registered and events loop started: {}", bridge_url);
        }
        TransportMode::Webhook => {
            log::info!(
                "bridge transport registered (webhook mode): {}, events at /transport/webhook",
                bridge_url
            );
        }
    }

    let state = GatewayState {
        port: config.gateway.port,
        backend_url,
        webhook_secret,
        event_tx,
    };
    let app = axum::Router::new()
        .route("/", get(health_http))
        .route("/transport/webhook", post(transport_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(transport, transport_tasks))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the transport, awaits its inbound task, then releases the transport session.
async fn shutdown_signal(transport: Arc<dyn Transport>, transport_tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping transport");

    transport.stop();
    for h in transport_tasks {
        let abort = h.abort_handle();
        if tokio::time::timeout(TRANSPORT_STOP_GRACE, h).await.is_err() {
            log::debug!("{} inbound loop still busy, aborting it", transport.id());
            abort.abort();
        }
    }
    if let Err(e) = transport.shutdown().await {
        log::warn!("{} session release on shutdown: {}", transport.id(), e);
    }
    log::info!("transport stopped");
}

/// POST /transport/webhook: bridge event JSON. Verifies the optional secret and queues the event.
async fn transport_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: BridgeUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            log::debug!("transport webhook: bad event body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let Some(event) = update.into_event() else {
        return StatusCode::OK;
    };
    if state.event_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "backend": state.backend_url,
    }))
}
