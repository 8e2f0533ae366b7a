// Text Analysis Desktop - Readiness Probe
// Polls the backend root address until it answers

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::ProbePolicy;

const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single probe attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    /// Not reachable yet; retry
    NotReady(String),
    /// Probing cannot succeed (bad address, broken client); give up
    Error(String),
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HTTP GET against the backend; any response at all means ready
pub struct HttpProbe {
    client: Option<reqwest::Client>,
    build_error: Option<String>,
}

impl HttpProbe {
    pub fn new() -> Self {
        match reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .no_proxy()
            .build()
        {
            Ok(client) => Self {
                client: Some(client),
                build_error: None,
            },
            Err(e) => Self {
                client: None,
                build_error: Some(e.to_string()),
            },
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let Some(client) = &self.client else {
            return ProbeOutcome::Error(
                self.build_error
                    .clone()
                    .unwrap_or_else(|| "http client unavailable".to_string()),
            );
        };

        match client.get(url).send().await {
            // Status code is irrelevant, the server is accepting requests
            Ok(resp) => {
                tracing::debug!(url, status = %resp.status(), "probe answered");
                ProbeOutcome::Ready
            }
            Err(e) if e.is_builder() => ProbeOutcome::Error(e.to_string()),
            Err(e) => ProbeOutcome::NotReady(e.to_string()),
        }
    }
}

/// Successful wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("not ready after {attempts} attempts in {elapsed:?}")]
    TimedOut { attempts: u32, elapsed: Duration },

    #[error("{0}")]
    Probe(String),
}

/// Probe immediately, then once per interval, until ready or the timeout passes
pub async fn wait_for_ready(
    probe: &dyn ReadinessProbe,
    url: &str,
    policy: ProbePolicy,
) -> Result<ProbeReport, ProbeFailure> {
    let started = Instant::now();
    // No deadline when the timeout does not fit the clock
    let deadline = started.checked_add(policy.timeout);
    let mut attempts = 0u32;

    tracing::info!(url, interval = ?policy.interval, timeout = ?policy.timeout, "waiting for backend");

    loop {
        attempts += 1;
        match probe.probe(url).await {
            ProbeOutcome::Ready => {
                let elapsed = started.elapsed();
                tracing::info!(url, attempts, ?elapsed, "backend is ready");
                return Ok(ProbeReport { attempts, elapsed });
            }
            ProbeOutcome::NotReady(reason) => {
                tracing::debug!(url, attempts, %reason, "backend not ready yet");
            }
            ProbeOutcome::Error(reason) => {
                tracing::error!(url, attempts, %reason, "readiness probe failed");
                return Err(ProbeFailure::Probe(reason));
            }
        }

        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                return Err(ProbeFailure::TimedOut {
                    attempts,
                    elapsed: now - started,
                });
            }
            Some(deadline) => policy.interval.min(deadline - now),
            None => policy.interval,
        };
        tokio::time::sleep(pause).await;
    }
}
