use std::error::Error as StdError;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::database::models::Monitor;

/// Successful probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    /// Detail worth keeping when the monitor has `always_save` set
    pub diagnostic: String,
    pub latency_ms: u64,
}

impl Probe {
    pub fn new(diagnostic: impl Into<String>, latency_ms: u64) -> Self {
        Self { diagnostic: diagnostic.into(), latency_ms }
    }
}

/// Failed probe. This is check data, not an error of the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProbeFailure {
    /// Longer explanation, may be empty
    pub diagnostic: String,
    pub latency_ms: u64,
    pub message: String,
}

impl ProbeFailure {
    pub fn new(message: impl Into<String>, latency_ms: u64) -> Self {
        Self { diagnostic: String::new(), latency_ms, message: message.into() }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }

    pub fn cancelled(started: Instant) -> Self {
        Self::new("check cancelled", elapsed_ms(started))
    }

    pub fn timed_out(started: Instant, timeout: Duration) -> Self {
        Self::new(format!("timed out after {}s", timeout.as_secs()), elapsed_ms(started))
    }
}

/// One probe strategy, registered per connection type.
///
/// Implementations must return promptly once `cancel` fires.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure>;
}

/// Timeout for a monitor, falling back to the handler default when unset
pub fn probe_timeout(monitor: &Monitor, default: Duration) -> Duration {
    match monitor.spec.timeout {
        0 => default,
        seconds => Duration::from_secs(seconds),
    }
}

/// Run `future` bounded by `timeout` and `cancel`
pub async fn bounded<F, T>(
    cancel: &CancellationToken,
    timeout: Duration,
    started: Instant,
    future: F,
) -> Result<T, ProbeFailure>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeFailure::cancelled(started)),
        res = tokio::time::timeout(timeout, future) => {
            res.map_err(|_| ProbeFailure::timed_out(started, timeout))
        }
    }
}

pub fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Render an error together with its sources
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
