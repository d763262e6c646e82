use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::Platform;

/// Primary key of a persisted monitor
pub type MonitorId = i64;

/// Kind of probe a monitor runs, used to pick the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Http,
    Ping,
    Container,
    Tcp,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 4] =
        [ConnectionType::Http, ConnectionType::Ping, ConnectionType::Container, ConnectionType::Tcp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Http => "http",
            ConnectionType::Ping => "ping",
            ConnectionType::Container => "container",
            ConnectionType::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionType::ALL
            .into_iter()
            .find(|ct| ct.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown connection type: {s}"))
    }
}

/// Extra request header sent by HTTP monitors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub key: String,
    pub value: String,
}

/// Per-monitor alerting configuration.
///
/// Templates are optional; when absent the default alert wording is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationConfig {
    pub enabled: bool,
    pub platform: Platform,
    pub webhook: String,
    pub issue_title: Option<String>,
    pub issue_body: Option<String>,
    pub recovery_title: Option<String>,
    pub recovery_body: Option<String>,
}

/// User supplied monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub connection: String,
    pub connection_type: ConnectionType,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    /// Probe timeout in seconds, 0 means the handler default
    #[serde(default)]
    pub timeout: u64,
    /// Seconds between two checks
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub always_save: bool,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: Vec<HttpHeader>,
    #[serde(default)]
    pub notification: NotificationConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_interval() -> u64 {
    60
}

impl MonitorSpec {
    /// Create a new enabled monitor spec with defaults for everything optional
    pub fn new(
        name: impl Into<String>,
        connection_type: ConnectionType,
        connection: impl Into<String>,
        interval: u64,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            connection: connection.into(),
            connection_type,
            http_method: default_http_method(),
            timeout: 0,
            interval,
            always_save: false,
            body: None,
            headers: Vec::new(),
            notification: NotificationConfig::default(),
        }
    }
}

/// A registered monitor with its running statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: MonitorId,
    #[serde(flatten)]
    pub spec: MonitorSpec,
    /// `None` until the first check, and again while disabled
    pub healthy: Option<bool>,
    pub checked: Option<DateTime<Utc>>,
    pub result: String,
    pub total_checks: u64,
    pub successful_checks: u64,
    /// Most recent checks, oldest first
    #[serde(default)]
    pub checks: Vec<MonitorCheck>,
}

impl Monitor {
    /// Wrap a spec into a monitor without any check history
    pub fn from_spec(id: MonitorId, spec: MonitorSpec) -> Self {
        Self {
            id,
            spec,
            healthy: None,
            checked: None,
            result: String::new(),
            total_checks: 0,
            successful_checks: 0,
            checks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_enabled(&self) -> bool {
        self.spec.enabled
    }

    /// Fraction of successful checks in percent, `None` before the first check
    pub fn uptime(&self) -> Option<f64> {
        if self.total_checks == 0 {
            return None;
        }
        Some(self.successful_checks as f64 * 100.0 / self.total_checks as f64)
    }

    /// Fold one finished check into the running statistics and the bounded
    /// in-memory history.
    pub fn record(&mut self, check: MonitorCheck, history_limit: usize) {
        self.checked = Some(check.created);
        self.healthy = Some(check.success);
        self.result = check.result.clone();
        self.total_checks += 1;
        if check.success {
            self.successful_checks += 1;
        }

        self.checks.push(check);
        if self.checks.len() > history_limit {
            let excess = self.checks.len() - history_limit;
            self.checks.drain(..excess);
        }
    }
}

/// One immutable history row, written once per probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorCheck {
    #[serde(skip)]
    pub monitor_id: MonitorId,
    pub created: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub result: String,
    pub response_time_ms: u64,
}
