use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use tokio_util::sync::CancellationToken;

use crate::config::Checks;
use crate::database::models::Monitor;
use crate::monitoring::checker::{
    Handler, Probe, ProbeFailure, bounded, elapsed_ms, error_chain, probe_timeout,
};

/// HTTP/HTTPS checker
pub struct HttpHandler {
    client: Client,
    default_timeout: Duration,
    body_limit: usize,
}

impl HttpHandler {
    pub fn new(settings: &Checks) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(settings.user_agent.as_str()).build()?;

        Ok(Self { client, default_timeout: settings.default_timeout(), body_limit: settings.body_limit })
    }
}

#[async_trait]
impl Handler for HttpHandler {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure> {
        let spec = &monitor.spec;
        let timeout = probe_timeout(monitor, self.default_timeout);
        let start = Instant::now();

        let method = Method::from_bytes(spec.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProbeFailure::new(format!("invalid HTTP method {}", spec.http_method), 0))?;

        let mut request = self.client.request(method, &spec.connection).timeout(timeout);
        for header in &spec.headers {
            request = request.header(header.key.as_str(), header.value.as_str());
        }
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        let response = bounded(cancel, timeout, start, request.send())
            .await?
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("timed out after {}s", timeout.as_secs())
                } else {
                    error_chain(&e)
                };
                ProbeFailure::new(message, elapsed_ms(start))
            })?;

        let latency_ms = elapsed_ms(start);
        let status = response.status();
        let summary = format!(
            "HTTP {} {} after {}ms from {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            latency_ms,
            spec.connection
        );

        if status.as_u16() >= 400 {
            let body = read_limited(response, self.body_limit, cancel).await;
            return Err(ProbeFailure::new(format!("HTTP {}", status.as_u16()), latency_ms)
                .with_diagnostic(join_summary(summary, &body)));
        }

        if spec.always_save {
            let body = read_limited(response, self.body_limit, cancel).await;
            return Ok(Probe::new(join_summary(summary, &body), latency_ms));
        }

        Ok(Probe::new(summary, latency_ms))
    }
}

fn join_summary(summary: String, body: &str) -> String {
    if body.trim().is_empty() { summary } else { format!("{summary}\n{body}") }
}

/// Read at most `limit` bytes of the body, giving up quietly on errors
async fn read_limited(mut response: Response, limit: usize, cancel: &CancellationToken) -> String {
    let mut buf: Vec<u8> = Vec::new();

    while buf.len() < limit {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = response.chunk() => chunk,
        };
        match chunk {
            Ok(Some(bytes)) => {
                let take = bytes.len().min(limit - buf.len());
                buf.extend_from_slice(&bytes[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read response body");
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}
