use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::InspectContainerOptions;
use bollard::errors::Error as DockerError;
use bollard::models::ContainerState;
use tokio_util::sync::CancellationToken;

use crate::database::models::Monitor;
use crate::monitoring::checker::{Handler, Probe, ProbeFailure, bounded, elapsed_ms, error_chain, probe_timeout};

/// Checks a container is running through the Docker Engine API
pub struct ContainerHandler {
    docker: Docker,
    default_timeout: Duration,
}

impl ContainerHandler {
    /// Connect through `DOCKER_HOST`, or the platform's default socket
    pub fn new(default_timeout: Duration) -> Result<Self, DockerError> {
        Ok(Self::with_client(Docker::connect_with_local_defaults()?, default_timeout))
    }

    pub fn with_client(docker: Docker, default_timeout: Duration) -> Self {
        Self { docker, default_timeout }
    }
}

/// `Err` carries the state to report when the container is not running
fn running_state(state: Option<&ContainerState>) -> Result<(), String> {
    let Some(state) = state else {
        return Err("in an unknown state".into());
    };

    if state.running == Some(true) {
        return Ok(());
    }

    match &state.status {
        Some(status) => Err(status.to_string()),
        None => Err("not running".into()),
    }
}

#[async_trait]
impl Handler for ContainerHandler {
    async fn check(&self, cancel: &CancellationToken, monitor: &Monitor) -> Result<Probe, ProbeFailure> {
        let name = monitor.spec.connection.as_str();
        let timeout = probe_timeout(monitor, self.default_timeout);
        let start = Instant::now();

        let inspect = self.docker.inspect_container(name, None::<InspectContainerOptions>);
        let inspect = bounded(cancel, timeout, start, inspect).await?.map_err(|e| {
            ProbeFailure::new(format!("container {name} could not be inspected"), elapsed_ms(start))
                .with_diagnostic(error_chain(&e))
        })?;

        let latency_ms = elapsed_ms(start);
        match running_state(inspect.state.as_ref()) {
            Ok(()) => Ok(Probe::new(format!("Container {name} is running"), latency_ms)),
            Err(state) => Err(ProbeFailure::new(format!("container {name} is {state}"), latency_ms)),
        }
    }
}
