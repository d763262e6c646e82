use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Span, debug, info, warn};

use super::checker::Handler;
use super::executor::CheckRun;
use super::runner::Runner;
use super::validation::validate_spec;
use crate::database::models::{ConnectionType, Monitor, MonitorId, MonitorSpec};
use crate::database::{DEFAULT_HISTORY_LIMIT, Store};
use crate::error::{ManagerError, Result};
use crate::notification::NotifierFactory;

/// Per-monitor ordering of checks.
///
/// `gate` is held for a whole check, from probe to alert, and by update and
/// remove while they swap the monitor out. `cancel` is the parent of every
/// check token of the monitor, scheduled or manual.
pub(crate) struct Lane {
    pub(crate) gate: Arc<Mutex<()>>,
    pub(crate) cancel: CancellationToken,
}

/// Maps guarded together by the registry lock
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) monitors: HashMap<MonitorId, Monitor>,
    pub(crate) runners: HashMap<MonitorId, Runner>,
    pub(crate) lanes: HashMap<MonitorId, Lane>,
    pub(crate) handlers: HashMap<ConnectionType, Arc<dyn Handler>>,
}

impl Registry {
    /// Reject a spec that would clash with a monitor other than `except`
    fn check_conflicts(&self, spec: &MonitorSpec, except: Option<MonitorId>) -> Result<()> {
        let others = move || self.monitors.values().filter(move |m| Some(m.id) != except);

        if others().any(|m| m.spec.name == spec.name) {
            return Err(ManagerError::DuplicateName(spec.name.clone()));
        }

        if !self.handlers.contains_key(&spec.connection_type) {
            return Err(ManagerError::UnknownConnectionType(spec.connection_type));
        }

        if others().any(|m| m.spec.connection == spec.connection) {
            return Err(ManagerError::DuplicateConnection(spec.connection.clone()));
        }

        Ok(())
    }

    /// Cancel every check of `id` and hand out its gate
    fn close_lane(&mut self, id: MonitorId) -> Arc<Mutex<()>> {
        match self.lanes.get(&id) {
            Some(lane) => {
                lane.cancel.cancel();
                Arc::clone(&lane.gate)
            }
            None => Arc::default(),
        }
    }
}

/// State shared between the manager and its runner tasks
pub(crate) struct Core {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) notifiers: Arc<dyn NotifierFactory>,
    pub(crate) registry: Mutex<Registry>,
    /// Serialises add/update/remove/stop, held across runner joins
    lifecycle: Mutex<()>,
    pub(crate) root: CancellationToken,
    pub(crate) tracker: TaskTracker,
    pub(crate) span: Span,
    pub(crate) history_limit: usize,
}

impl Core {
    pub(crate) async fn interval_of(&self, id: MonitorId) -> Option<Duration> {
        let registry = self.registry.lock().await;
        registry.monitors.get(&id).map(|m| Duration::from_secs(m.spec.interval.max(1)))
    }

    pub(crate) async fn gate_of(&self, id: MonitorId) -> Option<Arc<Mutex<()>>> {
        let registry = self.registry.lock().await;
        registry.lanes.get(&id).map(|lane| Arc::clone(&lane.gate))
    }
}

pub struct ManagerBuilder {
    store: Arc<dyn Store>,
    notifiers: Arc<dyn NotifierFactory>,
    handlers: HashMap<ConnectionType, Arc<dyn Handler>>,
    span: Span,
    history_limit: usize,
}

impl ManagerBuilder {
    pub fn handler(mut self, connection_type: ConnectionType, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(connection_type, handler);
        self
    }

    /// Parent span of every runner task
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Recent checks kept with each monitor in memory
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn build(self) -> Manager {
        let registry = Registry { handlers: self.handlers, ..Registry::default() };

        Manager {
            core: Arc::new(Core {
                store: self.store,
                notifiers: self.notifiers,
                registry: Mutex::new(registry),
                lifecycle: Mutex::new(()),
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
                span: self.span,
                history_limit: self.history_limit,
            }),
        }
    }
}

/// Owns every monitor and runs one check loop per monitor.
///
/// Dropping the manager cancels all loops; call [`Manager::stop`] to also
/// wait for them.
pub struct Manager {
    core: Arc<Core>,
}

impl Manager {
    pub fn builder(store: Arc<dyn Store>, notifiers: Arc<dyn NotifierFactory>) -> ManagerBuilder {
        ManagerBuilder {
            store,
            notifiers,
            handlers: HashMap::new(),
            span: Span::current(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Associate a connection type with its handler, replacing any previous one
    pub async fn register_handler(&self, connection_type: ConnectionType, handler: Arc<dyn Handler>) {
        let mut registry = self.core.registry.lock().await;
        registry.handlers.insert(connection_type, handler);
    }

    /// Load every persisted monitor and start its runner.
    ///
    /// Monitors without a registered handler are kept but not run.
    pub async fn boot(&self) -> Result<usize> {
        let _lifecycle = self.core.lifecycle.lock().await;
        let monitors = self.core.store.load_all().await?;
        let count = monitors.len();

        let mut registry = self.core.registry.lock().await;
        for monitor in monitors {
            let id = monitor.id;
            let connection_type = monitor.spec.connection_type;
            registry.monitors.insert(id, monitor);

            let cancel = self.core.root.child_token();
            let lane = Lane { gate: Arc::default(), cancel: cancel.clone() };
            if let Some(previous) = registry.lanes.insert(id, lane) {
                previous.cancel.cancel();
            }

            if !registry.handlers.contains_key(&connection_type) {
                warn!(monitor_id = id, %connection_type, "No handler for monitor, not scheduling it");
                continue;
            }

            if let Some(previous) = registry.runners.insert(id, Runner::spawn(&self.core, id, &cancel)) {
                previous.cancel();
            }
        }

        info!(count, "Monitors loaded");
        Ok(count)
    }

    pub async fn add_monitor(&self, spec: MonitorSpec) -> Result<Monitor> {
        let _lifecycle = self.core.lifecycle.lock().await;

        validate_spec(&spec).into_result().map_err(ManagerError::Invalid)?;
        self.core.registry.lock().await.check_conflicts(&spec, None)?;

        let id = self.core.store.create(&spec).await?;
        let monitor = Monitor::from_spec(id, spec);

        let cancel = self.core.root.child_token();
        let mut registry = self.core.registry.lock().await;
        registry.monitors.insert(id, monitor.clone());
        registry.lanes.insert(id, Lane { gate: Arc::default(), cancel: cancel.clone() });
        registry.runners.insert(id, Runner::spawn(&self.core, id, &cancel));

        info!(monitor_id = id, name = %monitor.spec.name, "Monitor added");
        Ok(monitor)
    }

    /// Replace the configuration of a monitor, keeping its statistics
    pub async fn update_monitor(&self, id: MonitorId, spec: MonitorSpec) -> Result<Monitor> {
        let _lifecycle = self.core.lifecycle.lock().await;

        let (runner, gate) = {
            let mut registry = self.core.registry.lock().await;
            if !registry.monitors.contains_key(&id) {
                return Err(ManagerError::NotFound(id));
            }
            validate_spec(&spec).into_result().map_err(ManagerError::Invalid)?;
            registry.check_conflicts(&spec, Some(id))?;
            (registry.runners.remove(&id), registry.close_lane(id))
        };

        if let Some(runner) = runner {
            runner.stop().await;
        }
        // Wait out a manual check; it saw the cancelled lane and discards its outcome
        let _turn = gate.lock().await;

        let cancel = self.core.root.child_token();
        let updated = {
            let mut registry = self.core.registry.lock().await;
            let monitor = registry.monitors.get_mut(&id).ok_or(ManagerError::NotFound(id))?;
            monitor.spec = spec;
            let updated = monitor.clone();
            registry.lanes.insert(id, Lane { gate: Arc::clone(&gate), cancel: cancel.clone() });
            updated
        };

        let persisted = self.persist_update(&updated).await;

        let mut registry = self.core.registry.lock().await;
        registry.runners.insert(id, Runner::spawn(&self.core, id, &cancel));
        drop(registry);

        persisted?;
        info!(monitor_id = id, name = %updated.spec.name, "Monitor updated");
        Ok(updated)
    }

    async fn persist_update(&self, monitor: &Monitor) -> Result<()> {
        self.core.store.save(monitor).await?;
        self.core.store.upsert_notification(monitor.id, &monitor.spec.notification).await?;
        Ok(())
    }

    pub async fn remove_monitor(&self, id: MonitorId) -> Result<()> {
        let _lifecycle = self.core.lifecycle.lock().await;

        let (runner, gate) = {
            let mut registry = self.core.registry.lock().await;
            if !registry.monitors.contains_key(&id) {
                return Err(ManagerError::NotFound(id));
            }
            (registry.runners.remove(&id), registry.close_lane(id))
        };

        if let Some(runner) = runner {
            runner.stop().await;
        }
        let _turn = gate.lock().await;

        {
            let mut registry = self.core.registry.lock().await;
            registry.monitors.remove(&id);
            registry.lanes.remove(&id);
        }
        self.core.store.delete(id).await?;

        info!(monitor_id = id, "Monitor removed");
        Ok(())
    }

    /// Check a monitor now, outside of its schedule, and return the result.
    ///
    /// Waits for a check already in flight. An update or removal that starts
    /// meanwhile cancels this check and nothing of it is recorded.
    pub async fn run_monitor(&self, id: MonitorId) -> Result<Monitor> {
        {
            let registry = self.core.registry.lock().await;
            let monitor = registry.monitors.get(&id).ok_or(ManagerError::NotFound(id))?;
            if !monitor.is_enabled() {
                return Err(ManagerError::Disabled(id));
            }
        }

        match self.core.run_manual(id).await {
            CheckRun::Recorded(monitor) => Ok(monitor),
            CheckRun::Missing => Err(ManagerError::NotFound(id)),
            CheckRun::Disabled => Err(ManagerError::Disabled(id)),
            CheckRun::NoHandler(connection_type) => Err(ManagerError::UnknownConnectionType(connection_type)),
            CheckRun::Cancelled => {
                debug!(monitor_id = id, "Manual check cancelled");
                let registry = self.core.registry.lock().await;
                registry.monitors.get(&id).cloned().ok_or(ManagerError::NotFound(id))
            }
        }
    }

    /// Load a monitor with its history from the store
    pub async fn get_monitor(&self, id: MonitorId) -> Result<Monitor> {
        self.core.store.find_by_id(id).await?.ok_or(ManagerError::NotFound(id))
    }

    /// Snapshot of every registered monitor, ordered by id
    pub async fn list_monitors(&self) -> Vec<Monitor> {
        let registry = self.core.registry.lock().await;
        let mut monitors: Vec<Monitor> = registry.monitors.values().cloned().collect();
        monitors.sort_by_key(|m| m.id);
        monitors
    }

    /// Number of live check loops
    pub async fn runner_count(&self) -> usize {
        let registry = self.core.registry.lock().await;
        registry.runners.values().filter(|r| !r.is_finished()).count()
    }

    /// Cancel every runner and wait for all of them to exit
    pub async fn stop(&self) {
        let _lifecycle = self.core.lifecycle.lock().await;

        self.core.root.cancel();
        self.core.tracker.close();
        self.core.tracker.wait().await;

        self.core.registry.lock().await.runners.clear();
        info!("Monitor manager stopped");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.core.root.cancel();
    }
}
