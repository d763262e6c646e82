//! Periodic pruning of old check history.
//!
//! The manager never deletes history rows; this task owns their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::Store;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// How long check rows are kept
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub check_days: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { check_days: 30 }
    }
}

impl RetentionPolicy {
    fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.check_days as i64)
    }
}

/// Cleanup manager for expired check rows
pub struct RetentionCleanup {
    store: Arc<dyn Store>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(store: Arc<dyn Store>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Delete checks older than the policy allows
    pub async fn cleanup_expired_checks(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.policy.retention();
        debug!(check_days = self.policy.check_days, %cutoff, "Pruning check history");

        let deleted = self.store.prune_checks(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "Retention cleanup completed");
        }
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour) until `cancel` fires
    pub fn start_periodic_cleanup(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if let Err(e) = self.cleanup_expired_checks().await {
                    warn!(error = %e, "Periodic retention cleanup failed");
                }
            }
        })
    }
}
