//! In-memory reconciler state: the cache owned exclusively by the driver thread.
//!
//! Upholds three invariants: commit monotonicity across published status
//! (never publish a SyncStatus for a commit whose SourceStatus failed to
//! land), rendering-before-source ordering within a pass, and cache coherence
//! between `source` and `parserResult` (the parser result is only trusted
//! while it's marked up to date with the current snapshot).

use crate::errors::PassError;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque identifier of a source snapshot. Total equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Commit(pub String);

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Commit {
    fn from(s: &str) -> Self {
        Commit(s.to_string())
    }
}

/// Absolute filesystem path to the directory holding declared objects for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncDir(pub PathBuf);

impl fmt::Display for SyncDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Files read from disk for one [`SourceSnapshot`], keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Files(pub Vec<(PathBuf, String)>);

/// `{commit, syncDir, files?}` — replaced atomically as a whole; `commit` and
/// `syncDir` never change within one snapshot once constructed.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub commit: Commit,
    pub sync_dir: SyncDir,
    pub files: Option<Files>,
}

impl SourceSnapshot {
    pub fn new(commit: Commit, sync_dir: SyncDir) -> Self {
        Self {
            commit,
            sync_dir,
            files: None,
        }
    }
}

/// A parsed declared object. Opaque to the core — the real shape is owned by
/// the Parser collaborator; we only need enough to hand it to Apply and to
/// tell blocking from non-blocking parse errors apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedObjects(pub Vec<String>);

/// Outcome of a parse attempt: objects plus errors, with a blocking/non-blocking split.
#[derive(Debug, Clone, Default)]
pub struct ParserResult {
    pub objects: ParsedObjects,
    pub errs: Vec<crate::errors::ReconcileErrorMessage>,
    pub blocking: bool,
}

impl Default for ParsedObjects {
    fn default() -> Self {
        ParsedObjects(Vec::new())
    }
}

/// `parserResult` plus the flag that marks it stale relative to the current
/// [`SourceSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct CachedParserResult {
    pub result: ParserResult,
    pub up_to_date: bool,
}

/// `RenderingStatus = {commit, message, errs, lastUpdate}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RenderingStatus {
    pub commit: Commit,
    pub message: RenderingMessage,
    pub errs: Vec<crate::errors::ReconcileErrorMessage>,
    #[serde(skip)]
    pub last_update: DateTimeWrapper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum RenderingMessage {
    InProgress,
    Succeeded,
    Failed,
    Skipped,
}

/// `SourceStatus = {commit, errs, lastUpdate}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceStatus {
    pub commit: Commit,
    pub errs: Vec<crate::errors::ReconcileErrorMessage>,
    #[serde(skip)]
    pub last_update: DateTimeWrapper,
}

/// `SyncStatus = {commit, syncing, errs, lastUpdate}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SyncStatus {
    pub commit: Commit,
    pub syncing: bool,
    pub errs: Vec<crate::errors::ReconcileErrorMessage>,
    #[serde(skip)]
    pub last_update: DateTimeWrapper,
}

/// Wrapper so `DateTime<Utc>` can sit in a `PartialEq`-derived struct used for
/// value-equality suppression without the timestamp itself ever being part of
/// that comparison.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeWrapper(pub DateTime<Utc>);

impl PartialEq for DateTimeWrapper {
    fn eq(&self, _other: &Self) -> bool {
        // lastUpdate is excluded from equivalence comparisons: two statuses
        // are "the same value" regardless of when they were computed.
        true
    }
}
impl Eq for DateTimeWrapper {}

/// Last successfully published values of the three sub-statuses.
#[derive(Debug, Clone, Default)]
pub struct Published {
    pub rendering: Option<RenderingStatus>,
    pub source: Option<SourceStatus>,
    pub sync: Option<SyncStatus>,
}

/// Retry bookkeeping: `failed`, `attempt`, and the next eligible instant,
/// scheduled by a `backoff::ExponentialBackoff` the same way
/// `kube-runtime`'s `BackoffErrorPolicy` drives one per object.
#[derive(Clone)]
pub struct RetryState {
    pub failed: bool,
    pub attempt: u32,
    pub next_eligible: Instant,
    backoff: ExponentialBackoff,
}

impl fmt::Debug for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryState")
            .field("failed", &self.failed)
            .field("attempt", &self.attempt)
            .field("next_eligible", &self.next_eligible)
            .finish()
    }
}

impl RetryState {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            failed: false,
            attempt: 0,
            next_eligible: Instant::now(),
            backoff: ExponentialBackoff {
                current_interval: base,
                initial_interval: base,
                randomization_factor: 0.0,
                multiplier: 2.0,
                max_interval: cap,
                max_elapsed_time: None,
                ..ExponentialBackoff::default()
            },
        }
    }

    /// `failed && now >= nextEligible`.
    pub fn ready_to_retry(&self, now: Instant) -> bool {
        self.failed && now >= self.next_eligible
    }

    /// Records a failure and schedules the next eligible retry instant from
    /// the backoff policy's next interval: `base * multiplier^(n-1)` capped
    /// at `max_interval`, same as `ExponentialBackoff::next_backoff`.
    pub fn record_failure(&mut self, now: Instant) {
        self.failed = true;
        self.attempt += 1;
        let delay = self.backoff.next_backoff().unwrap_or(self.backoff.max_interval);
        self.next_eligible = now + delay;
    }

    /// A successful checkpoint resets `attempt` to 0, clears `failed`, and
    /// resets the backoff policy back to its initial interval.
    pub fn record_success(&mut self) {
        self.failed = false;
        self.attempt = 0;
        self.backoff.reset();
    }
}

/// Owned exclusively by the run loop; mutated only on the driver task.
pub struct ReconcilerState {
    pub source: Option<SourceSnapshot>,
    pub parser_result: CachedParserResult,
    pub published: Published,
    pub syncing_condition_last_update: Option<DateTime<Utc>>,
    pub retry: RetryState,
    pub checkpointed: bool,
}

impl ReconcilerState {
    pub fn new(retry_base: Duration, retry_cap: Duration) -> Self {
        Self {
            source: None,
            parser_result: CachedParserResult::default(),
            published: Published::default(),
            syncing_condition_last_update: None,
            retry: RetryState::new(retry_base, retry_cap),
            checkpointed: false,
        }
    }

    /// Clears `source` and `parserResult`.
    pub fn reset_cache(&mut self) {
        self.source = None;
        self.parser_result = CachedParserResult::default();
    }

    /// Clears `parserResult` and sync bookkeeping but keeps `source`, avoiding a re-read.
    pub fn reset_all_but_source_state(&mut self) {
        self.parser_result = CachedParserResult::default();
        self.published.sync = None;
    }

    /// Marks the retry budget failed, clears the checkpoint, and records errors.
    pub fn invalidate(&mut self, now: Instant, _errs: &PassError) {
        self.retry.record_failure(now);
        self.checkpointed = false;
    }

    /// Marks the most recent pass as having succeeded end-to-end.
    pub fn checkpoint(&mut self) {
        self.checkpointed = true;
        self.retry.record_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_is_capped_exponential() {
        let mut r = RetryState::new(Duration::from_secs(5), Duration::from_secs(60));
        let t0 = Instant::now();
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(5));
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(10));
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(20));
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(40));
        // capped at 60s from here on
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(60));
        r.record_failure(t0);
        assert_eq!(r.next_eligible - t0, Duration::from_secs(60));
    }

    #[test]
    fn checkpoint_resets_attempt_and_failed() {
        let mut r = RetryState::new(Duration::from_secs(5), Duration::from_secs(60));
        r.record_failure(Instant::now());
        assert!(r.failed);
        assert_eq!(r.attempt, 1);
        r.record_success();
        assert!(!r.failed);
        assert_eq!(r.attempt, 0);
    }

    #[test]
    fn reset_all_but_source_state_keeps_source() {
        let mut st = ReconcilerState::new(Duration::from_secs(5), Duration::from_secs(60));
        st.source = Some(SourceSnapshot::new(Commit::from("c1"), SyncDir(PathBuf::from("/x"))));
        st.parser_result.up_to_date = true;
        st.reset_all_but_source_state();
        assert!(st.source.is_some());
        assert!(!st.parser_result.up_to_date);
    }

    #[test]
    fn reset_cache_clears_source_and_parser_result() {
        let mut st = ReconcilerState::new(Duration::from_secs(5), Duration::from_secs(60));
        st.source = Some(SourceSnapshot::new(Commit::from("c1"), SyncDir(PathBuf::from("/x"))));
        st.parser_result.up_to_date = true;
        st.reset_cache();
        assert!(st.source.is_none());
        assert!(!st.parser_result.up_to_date);
    }
}
