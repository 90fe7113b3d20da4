//! Run loop: selects the next trigger and executes exactly one ordered pass.
//! Single-threaded owner of [`ReconcilerState`], mirroring how
//! `kube-runtime`'s `Controller` owns its scheduler and applier state on one
//! task and only ever hands out `Context<T>` clones elsewhere.

use crate::conflict;
use crate::errors::{PassError, ReconcileErrorMessage};
use crate::metrics::{PassOutcome, StatusKind, Trigger};
use crate::periodic;
use crate::render::RenderOutcome;
use crate::state::{
    CachedParserResult, Commit, DateTimeWrapper, ReconcilerState, RenderingMessage, RenderingStatus, SourceSnapshot, SourceStatus,
    SyncStatus,
};
use crate::status::{published_commits_equal, StatusPublisher, StatusWriter};
use crate::errors::StatusWriteError;
use crate::timers::{TimerKind, Timers};
use crate::Options;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reports watch/remediator signals the `retry` timer's conditional triggers
/// depend on.
pub trait WatchCollaborator: Send + Sync {
    fn need_to_update_watch(&self) -> bool;
    fn management_conflict(&self) -> bool;
}

/// A `WatchCollaborator` that never reports anything pending — the default
/// for callers that have no remediator/watch subsystem wired in yet.
pub struct NoWatch;

impl WatchCollaborator for NoWatch {
    fn need_to_update_watch(&self) -> bool {
        false
    }
    fn management_conflict(&self) -> bool {
        false
    }
}

pub struct Driver {
    opts: Options,
    state: ReconcilerState,
    timers: Timers,
    status_writer: StatusWriter<std::sync::Arc<dyn StatusPublisher>>,
}

impl Driver {
    pub fn new(opts: Options) -> Self {
        let t = &opts.tunables;
        let timers = Timers::new(t.poll_period, t.resync_period, t.retry_check_period, t.status_update_period);
        let state = ReconcilerState::new(t.retry_base, t.retry_cap);
        let status_writer = StatusWriter::new(opts.status_publisher.clone(), t.status_min_rewrite_interval);
        Self {
            opts,
            state,
            timers,
            status_writer,
        }
    }

    /// Runs until `cancel` fires. Consumes `self`: the driver has no
    /// meaningful state to hand back once its loop exits.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(reconciler = %self.opts.reconciler_name, "driver stopping");
                    return;
                }
                kind = self.timers.next_fired() => {
                    self.handle_timer(kind, &cancel).await;
                }
            }
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind, cancel: &CancellationToken) {
        match kind {
            TimerKind::Resync => {
                self.state.reset_all_but_source_state();
                self.pass(Trigger::Resync, cancel).await;
                self.timers.reset_resync(self.opts.tunables.resync_period);
                self.restart_retry_cycle();
            }
            TimerKind::Poll => {
                self.pass(Trigger::Reimport, cancel).await;
                self.timers.reset_poll(self.opts.tunables.poll_period);
                self.restart_retry_cycle();
            }
            TimerKind::Retry => self.handle_retry_tick(cancel).await,
            TimerKind::StatusUpdate => {
                if published_commits_equal(&self.state.published) {
                    self.periodic_status_only().await;
                }
                // A statusUpdate tick that isn't a periodicStatus pass
                // restarts nothing of its own; `resync`/`poll` eventually
                // restart it.
                self.timers.disarm_status_update();
            }
        }
    }

    /// `managementConflict` > `retry` > `watchUpdate` > no-op. These are
    /// mutually exclusive per tick, first match wins, rather than composed.
    async fn handle_retry_tick(&mut self, cancel: &CancellationToken) {
        if self.opts.watch.management_conflict() {
            self.state.reset_all_but_source_state();
            tokio::time::sleep(self.opts.tunables.poll_period).await;
            self.pass(Trigger::ManagementConflict, cancel).await;
            self.restart_retry_cycle();
        } else if self.state.retry.ready_to_retry(Instant::now()) {
            self.pass(Trigger::Retry, cancel).await;
            self.restart_retry_cycle();
        } else if self.opts.watch.need_to_update_watch() {
            self.pass(Trigger::WatchUpdate, cancel).await;
            self.restart_retry_cycle();
        } else {
            self.timers.disarm_retry();
        }
    }

    fn restart_retry_cycle(&mut self) {
        self.timers.reset_retry(self.opts.tunables.retry_check_period);
        self.timers.reset_status_update(self.opts.tunables.status_update_period);
    }

    /// `periodicStatus`: refreshes only the `Syncing` condition's timestamp
    /// when all three published commits already agree — no phase pipeline
    /// runs.
    async fn periodic_status_only(&mut self) {
        let Some(prev) = self.state.published.sync.clone() else {
            return;
        };
        let status = SyncStatus {
            last_update: DateTimeWrapper(Utc::now()),
            ..prev
        };
        let _ = self.write_sync_status(status).await;
        self.finish(Trigger::PeriodicStatus, PassOutcome::Succeeded);
    }

    async fn write_rendering_status(&mut self, new: RenderingStatus) -> Result<bool, StatusWriteError> {
        let res = self.status_writer.write_rendering(&mut self.state, new).await;
        self.opts.metrics.record_status_write(StatusKind::Rendering, res.is_ok());
        res
    }

    async fn write_source_status(&mut self, new: SourceStatus) -> Result<bool, StatusWriteError> {
        let res = self.status_writer.write_source(&mut self.state, new).await;
        self.opts.metrics.record_status_write(StatusKind::Source, res.is_ok());
        res
    }

    async fn write_sync_status(&mut self, new: SyncStatus) -> Result<bool, StatusWriteError> {
        let res = self.status_writer.write_sync(&mut self.state, new).await;
        self.opts.metrics.record_status_write(StatusKind::Sync, res.is_ok());
        res
    }

    fn finish(&self, trigger: Trigger, outcome: PassOutcome) {
        tracing::debug!(%trigger, ?outcome, "pass complete");
        self.opts.metrics.record_pass(trigger, outcome);
    }

    /// The eight-stage phase pipeline: resolve source, gate on rendering,
    /// read files, parse, apply, publish, route conflicts, checkpoint.
    async fn pass(&mut self, trigger: Trigger, cancel: &CancellationToken) {
        tracing::debug!(%trigger, scope = ?self.opts.scope, "pass starting");
        let now_ts = || DateTimeWrapper(Utc::now());

        // 1. Resolve source.
        let (commit, sync_dir) = match self
            .opts
            .source_reader
            .source_commit_and_dir(&self.opts.reconciler_name)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                // Invalidate unconditionally; only the publish is gated on
                // transience — transient errors never reach SourceStatus.
                if !e.is_transient() {
                    if let Some(prev_commit) = self.state.source.as_ref().map(|s| s.commit.clone()) {
                        let status = SourceStatus {
                            commit: prev_commit,
                            errs: vec![ReconcileErrorMessage::new("source", e.to_string())],
                            last_update: now_ts(),
                        };
                        let _ = self.write_source_status(status).await;
                    }
                } else {
                    tracing::debug!(error = %e, "source not ready, will retry");
                }
                let pass_err = PassError::from_one("source", e.to_string());
                self.state.invalidate(Instant::now(), &pass_err);
                self.finish(trigger, PassOutcome::Failed);
                return;
            }
        };

        // 2. Evaluate render gate.
        match self.opts.render_gate.evaluate(&commit) {
            Err(e) => {
                let status = RenderingStatus {
                    commit: commit.clone(),
                    message: RenderingMessage::Failed,
                    errs: vec![ReconcileErrorMessage::new("render", e.to_string())],
                    last_update: now_ts(),
                };
                let _ = self.write_rendering_status(status).await;
                let pass_err = PassError::from_one("render", e.to_string());
                self.state.invalidate(Instant::now(), &pass_err);
                self.finish(trigger, PassOutcome::Failed);
                return;
            }
            Ok(RenderOutcome::InProgress) => {
                let status = RenderingStatus {
                    commit: commit.clone(),
                    message: RenderingMessage::InProgress,
                    errs: Vec::new(),
                    last_update: now_ts(),
                };
                // Reset the cache only when this publish actually succeeds,
                // so a failed write can't desync it from the cached state.
                if self.write_rendering_status(status).await.is_ok() {
                    self.state.reset_cache();
                }
                self.finish(trigger, PassOutcome::Skipped);
                return;
            }
            Ok(outcome) => {
                let message = match outcome {
                    RenderOutcome::Succeeded => RenderingMessage::Succeeded,
                    RenderOutcome::Skipped => RenderingMessage::Skipped,
                    RenderOutcome::InProgress => unreachable!("handled above"),
                };
                let status = RenderingStatus {
                    commit: commit.clone(),
                    message,
                    errs: Vec::new(),
                    last_update: now_ts(),
                };
                if let Err(e) = self.write_rendering_status(status).await {
                    tracing::warn!(error = %e, "rendering status write failed, continuing pass");
                }
            }
        }

        // 3. Read files.
        let sync_dir_changed = self.state.source.as_ref().map(|s| s.sync_dir != sync_dir).unwrap_or(true);
        if sync_dir_changed {
            self.state.reset_cache();
            match self.opts.file_loader.load(&sync_dir).await {
                Ok(files) => {
                    self.state.source = Some(SourceSnapshot {
                        commit: commit.clone(),
                        sync_dir: sync_dir.clone(),
                        files: Some(files),
                    });
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(error = %e, "file load transient, will retry next tick");
                    self.finish(trigger, PassOutcome::Failed);
                    return;
                }
                Err(e) => {
                    let status = SourceStatus {
                        commit: commit.clone(),
                        errs: vec![ReconcileErrorMessage::new("files", e.to_string())],
                        last_update: now_ts(),
                    };
                    let _ = self.write_source_status(status).await;
                    let pass_err = PassError::from_one("files", e.to_string());
                    self.state.invalidate(Instant::now(), &pass_err);
                    self.finish(trigger, PassOutcome::Failed);
                    return;
                }
            }
        }

        // 4. Early exit: a reimport tick over an unchanged syncDir has nothing to do.
        if trigger == Trigger::Reimport && !sync_dir_changed {
            self.finish(trigger, PassOutcome::Skipped);
            return;
        }

        // 5. Parse.
        if !self.state.parser_result.up_to_date {
            let snapshot = self
                .state
                .source
                .clone()
                .expect("stage 3 always populates state.source before stage 5 runs");
            let result = self.opts.parser.parse_source(&snapshot).await;
            let blocking = result.blocking;
            let parse_errs = result.errs.clone();
            self.state.parser_result = CachedParserResult { result, up_to_date: true };

            let status = SourceStatus {
                commit: commit.clone(),
                errs: parse_errs.clone(),
                last_update: now_ts(),
            };
            if let Err(e) = self.write_source_status(status).await {
                // Never publish SyncStatus for this commit once
                // SourceStatus failed to land.
                let pass_err = PassError::from_one("status", e.to_string());
                self.state.invalidate(Instant::now(), &pass_err);
                self.finish(trigger, PassOutcome::Failed);
                return;
            }
            if blocking {
                let pass_err = PassError { entries: parse_errs };
                self.state.invalidate(Instant::now(), &pass_err);
                self.finish(trigger, PassOutcome::Failed);
                return;
            }
        }

        // 6. Apply, with the periodic sync-status publisher running alongside.
        let child = cancel.child_token();
        let periodic_handle = tokio::spawn(periodic::run(
            self.opts.status_publisher.clone(),
            self.opts.applier.clone(),
            commit.clone(),
            self.opts.tunables.status_update_period,
            child.clone(),
        ));
        let sync_errs = self.opts.applier.update(&self.state.parser_result.result.objects).await;
        child.cancel();
        let _ = periodic_handle.await;

        // 7. Publish final SyncStatus, then route conflicts.
        let errs: Vec<_> = sync_errs.iter().map(|e| e.message.clone()).collect();
        let status = SyncStatus {
            commit: commit.clone(),
            syncing: false,
            errs,
            last_update: now_ts(),
        };
        let write_result = self.write_sync_status(status).await;

        let conflicts: Vec<_> = sync_errs.iter().filter(|e| e.conflict.is_some()).cloned().collect();
        let conflict_failures = conflict::route_conflicts(
            self.opts.conflict_reporter.as_ref(),
            &conflicts,
            self.opts.tunables.conflict_denominator,
        )
        .await;

        // 8. Checkpoint only if every stage, including status publication, succeeded.
        if sync_errs.is_empty() && write_result.is_ok() && conflict_failures.is_empty() {
            self.state.checkpoint();
            self.finish(trigger, PassOutcome::Succeeded);
        } else {
            let mut pass_err = PassError::default();
            for e in &sync_errs {
                pass_err.entries.push(e.message.clone());
            }
            if let Err(e) = &write_result {
                pass_err.push("status", e.to_string());
            }
            for f in &conflict_failures {
                pass_err.push("conflict", f.to_string());
            }
            self.state.invalidate(Instant::now(), &pass_err);
            self.finish(trigger, PassOutcome::Failed);
        }
    }
}
