//! tocsin keeps an eye on HTTP endpoints, TCP ports, hosts and containers
//! and alerts when their health changes.

pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod notification;
pub mod pool;
pub mod retention;

#[cfg(test)]
mod testing;

pub use database::models::{ConnectionType, Monitor, MonitorCheck, MonitorId, MonitorSpec};
pub use database::{DatabaseImpl, Store};
pub use error::ManagerError;
pub use monitoring::{Handler, Manager, ManagerBuilder, Probe, ProbeFailure};
pub use notification::{Message, Notifier, NotifierFactory};
