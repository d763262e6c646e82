use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span};

use super::executor::CheckRun;
use super::manager::Core;
use crate::database::models::MonitorId;

/// Handle on the check loop of one monitor
pub(crate) struct Runner {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Runner {
    /// Start the loop under `parent`; the first check runs right away
    pub(crate) fn spawn(core: &Arc<Core>, id: MonitorId, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let span = info_span!(parent: &core.span, "runner", monitor_id = id);
        let handle = core.tracker.spawn(run_loop(Arc::clone(core), id, cancel.clone()).instrument(span));

        Self { cancel, handle }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop without waiting for it
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the loop and wait until it has exited
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(error = %e, "Runner panicked");
            }
        }
    }
}

async fn run_loop(core: Arc<Core>, id: MonitorId, cancel: CancellationToken) {
    debug!("Runner started");

    while !cancel.is_cancelled() {
        if let CheckRun::Missing = core.run_check(id, &cancel).await {
            break;
        }

        let Some(interval) = core.interval_of(id).await else {
            break;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Runner stopped");
}
