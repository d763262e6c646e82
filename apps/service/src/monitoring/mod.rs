/// Monitoring engine
///
/// This module is responsible for:
/// - The handler contract and the built-in probes
/// - Per-monitor check loops
/// - Turning check outcomes into history and alerts
pub mod checker;
pub mod executor;
pub mod handlers;
pub mod manager;
mod runner;
pub mod validation;

pub use checker::{Handler, Probe, ProbeFailure};
pub use manager::{Manager, ManagerBuilder};
