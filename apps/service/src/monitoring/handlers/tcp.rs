use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::database::models::Monitor;
use crate::monitoring::checker::{Handler, Probe, ProbeFailure, bounded, elapsed_ms, probe_timeout};

/// TCP port checker
pub struct TcpHandler {
    default_timeout: Duration,
}

impl TcpHandler {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl Handler for TcpHandler {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure> {
        let target = monitor.spec.connection.as_str();
        let timeout = probe_timeout(monitor, self.default_timeout);
        let start = Instant::now();

        let stream = bounded(cancel, timeout, start, TcpStream::connect(target))
            .await?
            .map_err(|e| ProbeFailure::new(format!("TCP connection to {target} failed: {e}"), elapsed_ms(start)))?;

        let latency_ms = elapsed_ms(start);
        let peer = stream.peer_addr().map(|addr| addr.to_string()).unwrap_or_else(|_| target.to_string());
        drop(stream);

        Ok(Probe::new(format!("Connected to {peer} in {latency_ms}ms"), latency_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ConnectionType, MonitorSpec};
    use tokio::net::TcpListener;

    fn monitor(target: &str) -> Monitor {
        Monitor::from_spec(1, MonitorSpec::new("port", ConnectionType::Tcp, target, 30))
    }

    #[tokio::test]
    async fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handler = TcpHandler::new(Duration::from_secs(2));
        let probe = handler.check(&CancellationToken::new(), &monitor(&addr.to_string())).await.unwrap();
        assert!(probe.diagnostic.starts_with(&format!("Connected to {addr}")));
    }

    #[tokio::test]
    async fn test_closed_port() {
        let handler = TcpHandler::new(Duration::from_secs(2));
        let failure = handler.check(&CancellationToken::new(), &monitor("127.0.0.1:1")).await.unwrap_err();
        assert!(failure.message.starts_with("TCP connection to 127.0.0.1:1 failed"));
    }

    #[tokio::test]
    async fn test_cancelled_before_connect() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handler = TcpHandler::new(Duration::from_secs(2));
        let failure = handler.check(&cancel, &monitor("127.0.0.1:1")).await.unwrap_err();
        assert_eq!(failure.message, "check cancelled");
    }
}
