//! One check of one monitor: probe, fold the outcome into the registry,
//! persist it and alert on health transitions.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::checker::{Probe, ProbeFailure};
use super::manager::Core;
use crate::database::models::{ConnectionType, Monitor, MonitorCheck, MonitorId};
use crate::notification::{AlertKind, build_alert};

/// What became of a requested check
#[derive(Debug)]
pub(crate) enum CheckRun {
    /// The monitor left the registry
    Missing,
    Disabled,
    NoHandler(ConnectionType),
    /// The token fired while the probe was in flight, nothing was recorded
    Cancelled,
    Recorded(Monitor),
}

/// Probe result reduced to what gets stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub healthy: bool,
    pub result: String,
    pub latency_ms: u64,
}

impl Outcome {
    /// Failures keep their diagnostic (or the message when there is none),
    /// successes only keep it for `always_save` monitors.
    pub fn from_probe(probe: Result<Probe, ProbeFailure>, always_save: bool) -> Self {
        match probe {
            Ok(probe) => Self {
                healthy: true,
                result: if always_save { probe.diagnostic } else { String::new() },
                latency_ms: probe.latency_ms,
            },
            Err(failure) => Self {
                healthy: false,
                result: if failure.diagnostic.is_empty() { failure.message } else { failure.diagnostic },
                latency_ms: failure.latency_ms,
            },
        }
    }
}

/// Alert to send when health goes from `previous` to `healthy`.
///
/// Only entering the unhealthy state and leaving it are reported.
pub fn transition(previous: Option<bool>, healthy: bool) -> Option<AlertKind> {
    let was_unhealthy = previous == Some(false);
    match (was_unhealthy, healthy) {
        (false, false) => Some(AlertKind::Issue),
        (true, true) => Some(AlertKind::Recovery),
        _ => None,
    }
}

impl Core {
    /// Scheduled check, cancelled through the runner's token
    pub(crate) async fn run_check(&self, id: MonitorId, cancel: &CancellationToken) -> CheckRun {
        let Some(gate) = self.gate_of(id).await else {
            return CheckRun::Missing;
        };
        let _turn = gate.lock().await;
        self.check_in_turn(id, cancel).await
    }

    /// Check outside the schedule, cancelled along with the monitor's lane
    pub(crate) async fn run_manual(&self, id: MonitorId) -> CheckRun {
        let Some(gate) = self.gate_of(id).await else {
            return CheckRun::Missing;
        };
        let _turn = gate.lock().await;

        let cancel = {
            let registry = self.registry.lock().await;
            match registry.lanes.get(&id) {
                Some(lane) => lane.cancel.child_token(),
                None => return CheckRun::Missing,
            }
        };
        self.check_in_turn(id, &cancel).await
    }

    /// Probe, record, persist and alert. The caller holds the monitor's gate.
    async fn check_in_turn(&self, id: MonitorId, cancel: &CancellationToken) -> CheckRun {
        let started = Utc::now();

        let prepared = {
            let mut guard = self.registry.lock().await;
            let registry = &mut *guard;

            match registry.monitors.get_mut(&id) {
                None => return CheckRun::Missing,
                Some(monitor) if !monitor.is_enabled() => Err(monitor.healthy.take().is_some()),
                Some(monitor) => {
                    let connection_type = monitor.spec.connection_type;
                    let Some(handler) = registry.handlers.get(&connection_type).cloned() else {
                        warn!(monitor_id = id, %connection_type, "No handler registered");
                        return CheckRun::NoHandler(connection_type);
                    };
                    if cancel.is_cancelled() {
                        return CheckRun::Cancelled;
                    }
                    Ok((monitor.clone(), handler))
                }
            }
        };

        let (snapshot, handler) = match prepared {
            Ok(prepared) => prepared,
            Err(health_changed) => {
                if health_changed {
                    if let Err(e) = self.store.set_health(id, None).await {
                        error!(monitor_id = id, error = %e, "Failed to persist health of disabled monitor");
                    }
                }
                return CheckRun::Disabled;
            }
        };

        let outcome = Outcome::from_probe(handler.check(cancel, &snapshot).await, snapshot.spec.always_save);

        if cancel.is_cancelled() {
            debug!(monitor_id = id, "Check cancelled, discarding outcome");
            return CheckRun::Cancelled;
        }

        let check = MonitorCheck {
            monitor_id: id,
            created: started,
            success: outcome.healthy,
            result: outcome.result.clone(),
            response_time_ms: outcome.latency_ms,
        };

        let (updated, alert) = {
            let mut registry = self.registry.lock().await;
            let Some(monitor) = registry.monitors.get_mut(&id) else {
                return CheckRun::Missing;
            };

            let alert = transition(monitor.healthy, outcome.healthy);
            monitor.record(check.clone(), self.history_limit);
            (monitor.clone(), alert)
        };

        debug!(
            monitor_id = id,
            healthy = outcome.healthy,
            latency_ms = outcome.latency_ms,
            "Check finished"
        );

        if let Err(e) = self.store.append_check(&check).await {
            error!(monitor_id = id, error = %e, "Failed to store check");
        }
        if let Err(e) = self.store.save_state(&updated).await {
            error!(monitor_id = id, error = %e, "Failed to persist monitor state");
        }

        if let Some(kind) = alert {
            self.notify(kind, &updated, &outcome.result).await;
        }

        CheckRun::Recorded(updated)
    }

    async fn notify(&self, kind: AlertKind, monitor: &Monitor, result: &str) {
        let config = &monitor.spec.notification;
        if !config.enabled {
            return;
        }

        let message = build_alert(kind, monitor, result);
        let sent = match self.notifiers.notifier(config) {
            Ok(notifier) => notifier.send(&message).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => debug!(monitor_id = monitor.id, ?kind, "Alert sent"),
            Err(e) => error!(monitor_id = monitor.id, ?kind, error = %e, "Failed to send alert"),
        }
    }
}
