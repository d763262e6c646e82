use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::random;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio_util::sync::CancellationToken;

use crate::database::models::Monitor;
use crate::monitoring::checker::{Handler, Probe, ProbeFailure, bounded, elapsed_ms, probe_timeout};

const PAYLOAD: [u8; 56] = [0; 56];

/// ICMP echo checker
pub struct PingHandler {
    v4: Client,
    v6: Option<Client>,
    default_timeout: Duration,
}

impl PingHandler {
    /// Fails when the process may not open ICMP sockets
    pub fn new(default_timeout: Duration) -> std::io::Result<Self> {
        let v4 = Client::new(&Config::default())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "ICMPv6 unavailable, IPv6 ping targets will fail");
                None
            }
        };

        Ok(Self { v4, v6, default_timeout })
    }

    async fn resolve(host: &str) -> Result<IpAddr, String> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| format!("failed to resolve {host}: {e}"))?;
        addrs.next().map(|addr| addr.ip()).ok_or_else(|| format!("{host} has no addresses"))
    }
}

#[async_trait]
impl Handler for PingHandler {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure> {
        let host = monitor.spec.connection.as_str();
        let timeout = probe_timeout(monitor, self.default_timeout);
        let start = Instant::now();

        let addr = bounded(cancel, timeout, start, Self::resolve(host))
            .await?
            .map_err(|message| ProbeFailure::new(message, elapsed_ms(start)))?;

        let client = match addr {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self
                .v6
                .as_ref()
                .ok_or_else(|| ProbeFailure::new("ICMPv6 is not available on this host", elapsed_ms(start)))?,
        };

        let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
        pinger.timeout(timeout);

        let (_reply, rtt) = bounded(cancel, timeout, start, pinger.ping(PingSequence(0), &PAYLOAD))
            .await?
            .map_err(|e| ProbeFailure::new(format!("ping {host} ({addr}) failed: {e}"), elapsed_ms(start)))?;

        let latency_ms = rtt.as_millis() as u64;
        Ok(Probe::new(format!("Reply from {addr} in {latency_ms}ms"), latency_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal_addresses() {
        assert_eq!(PingHandler::resolve("127.0.0.1").await.unwrap(), IpAddr::from([127, 0, 0, 1]));
        assert!(PingHandler::resolve("::1").await.unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        assert!(PingHandler::resolve("localhost").await.unwrap().is_loopback());
    }
}
