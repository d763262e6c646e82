use thiserror::Error;

use crate::database::models::{ConnectionType, MonitorId};

/// Errors returned by the monitor manager API
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Invalid monitor: {0}")]
    Invalid(String),

    #[error("A monitor named {0:?} already exists")]
    DuplicateName(String),

    #[error("No handler registered for connection type {0}")]
    UnknownConnectionType(ConnectionType),

    #[error("Connection {0:?} is already monitored")]
    DuplicateConnection(String),

    #[error("Monitor {0} not found")]
    NotFound(MonitorId),

    #[error("Monitor {0} is disabled")]
    Disabled(MonitorId),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
