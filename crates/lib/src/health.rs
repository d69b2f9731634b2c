//! Startup health monitor: probe the backend a bounded number of times once the transport is ready.

use crate::backend::{Backend, HealthStatus};
use crate::config::HealthConfig;
use std::time::Duration;

/// How many probes, how far apart, and how long each may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for RetryPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Terminal state of the monitor.
#[derive(Debug)]
pub enum ProbeOutcome {
    Ready { status: HealthStatus, attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

/// Probe until the first success or until attempts run out. Sleeps only between attempts.
/// Exhaustion is logged as a warning; callers keep running either way.
pub async fn wait_for_backend(backend: &dyn Backend, policy: &RetryPolicy) -> ProbeOutcome {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        log::info!("health: checking backend (attempt {}/{})", attempt, attempts);
        match backend.health(policy.timeout).await {
            Ok(status) => {
                log::info!(
                    "health: backend ready, personality: {}",
                    status.personality()
                );
                return ProbeOutcome::Ready {
                    status,
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= attempts => {
                log::warn!(
                    "health: backend not reachable after {} attempts ({}); continuing without it",
                    attempts,
                    e
                );
                return ProbeOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e.to_string(),
                };
            }
            Err(e) => {
                log::debug!("health: attempt {} failed: {}", attempt, e);
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
