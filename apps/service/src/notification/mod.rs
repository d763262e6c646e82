//! Alert delivery.
//!
//! The manager only depends on [`Notifier`] and [`NotifierFactory`]; the
//! webhook implementation lives in [`webhook`].

pub mod template;
pub mod webhook;

pub use template::{AlertKind, build_alert};
pub use webhook::{WebhookFactory, WebhookNotifier};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::NotificationConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{platform} webhook returned {status}: {body}")]
    Rejected { platform: Platform, status: u16, body: String },

    #[error("Invalid notification configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }

    /// RGB color used by chat platforms that support one
    pub fn color(&self) -> u32 {
        match self {
            Level::Error => 0xFF0000,
            Level::Warning => 0xFFA500,
            Level::Info => 0x2ECC71,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook flavour, chosen explicitly in the monitor configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Slack,
    Teams,
    #[default]
    Generic,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Slack => "slack",
            Platform::Teams => "teams",
            Platform::Generic => "generic",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discord" => Ok(Platform::Discord),
            "slack" => Ok(Platform::Slack),
            "teams" => Ok(Platform::Teams),
            "generic" => Ok(Platform::Generic),
            other => Err(format!("unknown notification platform: {other}")),
        }
    }
}

/// A rendered alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub title: String,
    pub text: String,
    pub level: Level,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(title: impl Into<String>, text: impl Into<String>, level: Level) -> Self {
        Self { title: title.into(), text: text.into(), level, timestamp: Utc::now() }
    }
}

/// Delivers alerts somewhere. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Builds the notifier for one monitor's notification settings
pub trait NotifierFactory: Send + Sync {
    fn notifier(&self, config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError>;
}
