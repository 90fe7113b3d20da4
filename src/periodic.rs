//! Periodic sync-status publisher: the one auxiliary task that runs
//! alongside the driver, active only while an Apply is in flight.
//!
//! It writes straight through [`crate::status::StatusPublisher::set_sync_status`]
//! rather than through [`crate::status::StatusWriter`] — the driver is the
//! sole owner of [`crate::state::ReconcilerState`] and this task must not
//! touch it, so it has no `published.sync` baseline to suppress against and
//! always writes on each tick.

use crate::applier::Applier;
use crate::state::{Commit, DateTimeWrapper, SyncStatus};
use crate::status::StatusPublisher;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs until `cancel` fires, then returns promptly without performing a
/// final write — the driver publishes the authoritative post-Apply
/// `SyncStatus` itself once this task has exited, which is why `run` is
/// always `.await`ed to completion after cancelling the token, so the two
/// writers never race on the final status.
pub async fn run(
    publisher: Arc<dyn StatusPublisher>,
    applier: Arc<dyn Applier>,
    commit: Commit,
    period: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("periodic sync-status publisher cancelled");
                return;
            }
            _ = tokio::time::sleep(period) => {
                let status = SyncStatus {
                    commit: commit.clone(),
                    syncing: applier.syncing(),
                    errs: applier.sync_errors().into_iter().map(|e| e.message).collect(),
                    last_update: DateTimeWrapper(Utc::now()),
                };
                if let Err(e) = publisher.set_sync_status(&status).await {
                    tracing::warn!(error = %e, "periodic sync-status write failed");
                }
            }
        }
    }
}
