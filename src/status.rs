//! Status Publisher: writes the three status sub-resources (`rendering`,
//! `source`, `sync`) plus drives the `Syncing` condition's `lastUpdate`.
//!
//! Writes are skipped when the new value is equivalent to the last
//! successfully published one. "Equivalent" compares every field except
//! `lastUpdate` ([`crate::state::DateTimeWrapper`] makes that comparison
//! free), *unless* the previously published `lastUpdate` is older
//! than `min_rewrite_interval`, in which case we rewrite anyway so the status
//! doesn't look abandoned.

use crate::errors::StatusWriteError;
use crate::state::{Published, ReconcilerState, RenderingStatus, SourceStatus, SyncStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn set_rendering_status(&self, prev: Option<&RenderingStatus>, new: &RenderingStatus) -> Result<(), StatusWriteError>;
    async fn set_source_status(&self, new: &SourceStatus) -> Result<(), StatusWriteError>;
    async fn set_sync_status(&self, new: &SyncStatus) -> Result<(), StatusWriteError>;
}

/// Wraps a raw [`StatusPublisher`] with the value-equality suppression rule
/// and keeps [`ReconcilerState::published`]/`syncing_condition_last_update`
/// up to date on success.
pub struct StatusWriter<P> {
    publisher: P,
    min_rewrite_interval: Duration,
}

impl<P: StatusPublisher> StatusWriter<P> {
    pub fn new(publisher: P, min_rewrite_interval: Duration) -> Self {
        Self {
            publisher,
            min_rewrite_interval,
        }
    }

    /// Returns `Ok(true)` if a write actually happened, `Ok(false)` if it was
    /// suppressed as a no-op.
    pub async fn write_rendering(&self, state: &mut ReconcilerState, new: RenderingStatus) -> Result<bool, StatusWriteError> {
        if !should_write(state.published.rendering.as_ref(), &new, self.min_rewrite_interval) {
            return Ok(false);
        }
        tracing::debug!(body = %serde_json::to_string(&new).unwrap_or_default(), "writing rendering status");
        self.publisher
            .set_rendering_status(state.published.rendering.as_ref(), &new)
            .await?;
        note_last_update(state, new.last_update.0);
        state.published.rendering = Some(new);
        Ok(true)
    }

    pub async fn write_source(&self, state: &mut ReconcilerState, new: SourceStatus) -> Result<bool, StatusWriteError> {
        if !should_write(state.published.source.as_ref(), &new, self.min_rewrite_interval) {
            return Ok(false);
        }
        tracing::debug!(body = %serde_json::to_string(&new).unwrap_or_default(), "writing source status");
        self.publisher.set_source_status(&new).await?;
        note_last_update(state, new.last_update.0);
        state.published.source = Some(new);
        Ok(true)
    }

    pub async fn write_sync(&self, state: &mut ReconcilerState, new: SyncStatus) -> Result<bool, StatusWriteError> {
        if !should_write(state.published.sync.as_ref(), &new, self.min_rewrite_interval) {
            return Ok(false);
        }
        tracing::debug!(body = %serde_json::to_string(&new).unwrap_or_default(), "writing sync status");
        self.publisher.set_sync_status(&new).await?;
        note_last_update(state, new.last_update.0);
        state.published.sync = Some(new);
        Ok(true)
    }
}

fn note_last_update(state: &mut ReconcilerState, at: DateTime<Utc>) {
    state.syncing_condition_last_update = Some(at);
}

fn should_write<T: PartialEq + HasLastUpdate>(prev: Option<&T>, new: &T, min_interval: Duration) -> bool {
    match prev {
        None => true,
        Some(p) if p != new => true,
        Some(p) => {
            let age = new
                .last_update_at()
                .signed_duration_since(p.last_update_at())
                .to_std()
                .unwrap_or(Duration::ZERO);
            age >= min_interval
        }
    }
}

trait HasLastUpdate {
    fn last_update_at(&self) -> DateTime<Utc>;
}

impl HasLastUpdate for RenderingStatus {
    fn last_update_at(&self) -> DateTime<Utc> {
        self.last_update.0
    }
}
impl HasLastUpdate for SourceStatus {
    fn last_update_at(&self) -> DateTime<Utc> {
        self.last_update.0
    }
}
impl HasLastUpdate for SyncStatus {
    fn last_update_at(&self) -> DateTime<Utc> {
        self.last_update.0
    }
}

#[async_trait]
impl StatusPublisher for std::sync::Arc<dyn StatusPublisher> {
    async fn set_rendering_status(&self, prev: Option<&RenderingStatus>, new: &RenderingStatus) -> Result<(), StatusWriteError> {
        (**self).set_rendering_status(prev, new).await
    }
    async fn set_source_status(&self, new: &SourceStatus) -> Result<(), StatusWriteError> {
        (**self).set_source_status(new).await
    }
    async fn set_sync_status(&self, new: &SyncStatus) -> Result<(), StatusWriteError> {
        (**self).set_sync_status(new).await
    }
}

/// Reference to the last-published triple, used by callers that need to
/// confirm all three sub-statuses currently agree on the same commit.
pub fn published_commits_equal(published: &Published) -> bool {
    match (&published.rendering, &published.source, &published.sync) {
        (Some(r), Some(s), Some(y)) => r.commit == s.commit && s.commit == y.commit,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Commit, DateTimeWrapper};
    use chrono::Duration as ChronoDuration;

    fn ts(secs_ago: i64) -> DateTimeWrapper {
        DateTimeWrapper(Utc::now() - ChronoDuration::seconds(secs_ago))
    }

    #[test]
    fn first_write_is_never_suppressed() {
        let new = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(0),
        };
        assert!(should_write(None, &new, Duration::from_secs(60)));
    }

    #[test]
    fn identical_recent_value_is_suppressed() {
        let prev = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(1),
        };
        let new = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(0),
        };
        assert!(!should_write(Some(&prev), &new, Duration::from_secs(60)));
    }

    #[test]
    fn identical_stale_value_is_rewritten() {
        let prev = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(120),
        };
        let new = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(0),
        };
        assert!(should_write(Some(&prev), &new, Duration::from_secs(60)));
    }

    #[test]
    fn changed_value_is_always_written() {
        let prev = SourceStatus {
            commit: Commit::from("c1"),
            errs: vec![],
            last_update: ts(0),
        };
        let new = SourceStatus {
            commit: Commit::from("c2"),
            errs: vec![],
            last_update: ts(0),
        };
        assert!(should_write(Some(&prev), &new, Duration::from_secs(60)));
    }
}
