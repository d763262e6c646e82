//! In-memory stand-ins for the store, handlers and notifiers

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tocsin::database::models::NotificationConfig;
use tocsin::notification::NotifyError;
use tocsin::{
    ConnectionType, Handler, Manager, Message, Monitor, MonitorCheck, MonitorId, MonitorSpec,
    Notifier, NotifierFactory, Probe, ProbeFailure, Store,
};

#[derive(Default)]
struct StoreState {
    next_id: MonitorId,
    monitors: BTreeMap<MonitorId, Monitor>,
    checks: Vec<MonitorCheck>,
    creates: usize,
    health_writes: usize,
}

/// Store keeping everything in memory and counting writes
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_appends: AtomicBool,
    fail_state_writes: AtomicBool,
    state_write_delay: Mutex<Duration>,
}

impl MemoryStore {
    /// Pretend these monitors were persisted by an earlier run
    pub fn with_monitors(specs: Vec<MonitorSpec>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for spec in specs {
                state.next_id += 1;
                let id = state.next_id;
                state.monitors.insert(id, Monitor::from_spec(id, spec));
            }
        }
        store
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn health_writes(&self) -> usize {
        self.state.lock().unwrap().health_writes
    }

    pub fn checks_for(&self, id: MonitorId) -> Vec<MonitorCheck> {
        self.state.lock().unwrap().checks.iter().filter(|c| c.monitor_id == id).cloned().collect()
    }

    pub fn stored(&self, id: MonitorId) -> Option<Monitor> {
        self.state.lock().unwrap().monitors.get(&id).cloned()
    }

    /// Make `append_check` fail until switched back
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Make `save_state` fail until switched back
    pub fn fail_state_writes(&self, fail: bool) {
        self.fail_state_writes.store(fail, Ordering::SeqCst);
    }

    /// Every `save_state` waits this long before writing
    pub fn delay_state_writes(&self, delay: Duration) {
        *self.state_write_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Monitor>> {
        Ok(self.state.lock().unwrap().monitors.values().cloned().collect())
    }

    async fn find_by_id(&self, id: MonitorId) -> Result<Option<Monitor>> {
        let state = self.state.lock().unwrap();
        Ok(state.monitors.get(&id).cloned().map(|mut monitor| {
            monitor.checks = state.checks.iter().filter(|c| c.monitor_id == id).cloned().collect();
            monitor
        }))
    }

    async fn create(&self, spec: &MonitorSpec) -> Result<MonitorId> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        state.next_id += 1;
        let id = state.next_id;
        state.monitors.insert(id, Monitor::from_spec(id, spec.clone()));
        Ok(id)
    }

    async fn save(&self, monitor: &Monitor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.monitors.get_mut(&monitor.id).ok_or_else(|| anyhow!("no monitor {}", monitor.id))?;
        let notification = stored.spec.notification.clone();
        *stored = monitor.clone();
        stored.spec.notification = notification;
        stored.checks.clear();
        Ok(())
    }

    async fn save_state(&self, monitor: &Monitor) -> Result<()> {
        let delay = *self.state_write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_state_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }

        let mut state = self.state.lock().unwrap();
        let stored = state.monitors.get_mut(&monitor.id).ok_or_else(|| anyhow!("no monitor {}", monitor.id))?;
        stored.healthy = monitor.healthy;
        stored.checked = monitor.checked;
        stored.result = monitor.result.clone();
        stored.total_checks = monitor.total_checks;
        stored.successful_checks = monitor.successful_checks;
        Ok(())
    }

    async fn set_health(&self, id: MonitorId, healthy: Option<bool>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.health_writes += 1;
        let stored = state.monitors.get_mut(&id).ok_or_else(|| anyhow!("no monitor {id}"))?;
        stored.healthy = healthy;
        Ok(())
    }

    async fn delete(&self, id: MonitorId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.monitors.remove(&id);
        state.checks.retain(|c| c.monitor_id != id);
        Ok(())
    }

    async fn append_check(&self, check: &MonitorCheck) -> Result<i64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        let mut state = self.state.lock().unwrap();
        state.checks.push(check.clone());
        Ok(state.checks.len() as i64)
    }

    async fn upsert_notification(&self, id: MonitorId, config: &NotificationConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.monitors.get_mut(&id).ok_or_else(|| anyhow!("no monitor {id}"))?;
        stored.spec.notification = config.clone();
        Ok(())
    }

    async fn prune_checks(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let len = state.checks.len();
        state.checks.retain(|c| c.created >= before);
        Ok((len - state.checks.len()) as u64)
    }
}

/// Handler answering from a script of outcomes, then with a fixed default
pub struct ScriptedHandler {
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<(MonitorId, Instant)>>,
}

impl ScriptedHandler {
    pub fn healthy() -> Arc<Self> {
        Self::scripted([], true)
    }

    pub fn scripted(script: impl IntoIterator<Item = bool>, fallback: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every probe takes `delay` unless cancelled
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: true,
            delay: Mutex::new(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Slow down every check from now on
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self, id: MonitorId) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().filter(|(m, _)| *m == id).map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure> {
        self.calls.lock().unwrap().push((monitor.id, Instant::now()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeFailure::new("check cancelled", 0)),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let healthy = self.script.lock().unwrap().pop_front().unwrap_or(self.fallback);
        if healthy {
            Ok(Probe::new("fine", 5))
        } else {
            Err(ProbeFailure::new("scripted failure", 5))
        }
    }
}

/// Collects every alert that would have been delivered
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Message>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Records each attempt, then reports the webhook as down
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.title.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.failing {
            return Err(NotifyError::InvalidConfiguration("webhook unreachable".into()));
        }
        Ok(())
    }
}

impl NotifierFactory for RecordingNotifier {
    fn notifier(&self, _config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
        Ok(Arc::new(self.clone()))
    }
}

pub struct Harness {
    pub manager: Manager,
    pub store: Arc<MemoryStore>,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub fn new(handlers: Vec<(ConnectionType, Arc<dyn Handler>)>) -> Self {
        Self::with_store(MemoryStore::default(), handlers)
    }

    pub fn with_store(store: MemoryStore, handlers: Vec<(ConnectionType, Arc<dyn Handler>)>) -> Self {
        Self::assemble(store, RecordingNotifier::default(), handlers)
    }

    pub fn with_notifier(notifier: RecordingNotifier, handlers: Vec<(ConnectionType, Arc<dyn Handler>)>) -> Self {
        Self::assemble(MemoryStore::default(), notifier, handlers)
    }

    fn assemble(
        store: MemoryStore,
        notifier: RecordingNotifier,
        handlers: Vec<(ConnectionType, Arc<dyn Handler>)>,
    ) -> Self {
        let store = Arc::new(store);

        let mut builder = Manager::builder(store.clone(), Arc::new(notifier.clone()));
        for (connection_type, handler) in handlers {
            builder = builder.handler(connection_type, handler);
        }

        Self { manager: builder.build(), store, notifier }
    }
}

pub fn tcp_spec(name: &str, connection: &str, interval: u64) -> MonitorSpec {
    MonitorSpec::new(name, ConnectionType::Tcp, connection, interval)
}

/// Same as `tcp_spec` with alerts switched on
pub fn alerting_spec(name: &str, connection: &str, interval: u64) -> MonitorSpec {
    let mut spec = tcp_spec(name, connection, interval);
    spec.notification = NotificationConfig {
        enabled: true,
        webhook: "https://hooks.example.com/tocsin".into(),
        ..NotificationConfig::default()
    };
    spec
}

/// Poll `condition` for a few seconds (of virtual time when the clock is paused)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
