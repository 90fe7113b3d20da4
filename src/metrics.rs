//! Metrics sink: a fire-and-forget side channel with no influence on control
//! flow, generalized from `kube-runtime/src/metrics.rs`'s `Metrics` struct
//! into a trait so tests can assert what was recorded without a real backend.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Resync,
    Reimport,
    ManagementConflict,
    Retry,
    WatchUpdate,
    PeriodicStatus,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trigger::Resync => "resync",
            Trigger::Reimport => "reimport",
            Trigger::ManagementConflict => "managementConflict",
            Trigger::Retry => "retry",
            Trigger::WatchUpdate => "watchUpdate",
            Trigger::PeriodicStatus => "periodicStatus",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Rendering,
    Source,
    Sync,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusKind::Rendering => "rendering",
            StatusKind::Source => "source",
            StatusKind::Sync => "sync",
        };
        f.write_str(s)
    }
}

pub trait MetricsSink: Send + Sync {
    fn record_pass(&self, trigger: Trigger, outcome: PassOutcome);
    fn record_status_write(&self, kind: StatusKind, ok: bool);
}

/// Default wiring when nothing real is plugged in. Logs at debug rather than
/// dropping silently, so a missing sink is visible in traces during development.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_pass(&self, trigger: Trigger, outcome: PassOutcome) {
        tracing::debug!(%trigger, ?outcome, "pass recorded (no metrics sink configured)");
    }

    fn record_status_write(&self, kind: StatusKind, ok: bool) {
        tracing::debug!(%kind, ok, "status write recorded (no metrics sink configured)");
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingMetricsSink {
        pub passes: Mutex<Vec<(Trigger, PassOutcome)>>,
        pub status_writes: Mutex<Vec<(StatusKind, bool)>>,
    }

    impl MetricsSink for RecordingMetricsSink {
        fn record_pass(&self, trigger: Trigger, outcome: PassOutcome) {
            self.passes.lock().push((trigger, outcome));
        }

        fn record_status_write(&self, kind: StatusKind, ok: bool) {
            self.status_writes.lock().push((kind, ok));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingMetricsSink;
    use super::*;

    #[test]
    fn recording_sink_captures_calls_in_order() {
        let sink = RecordingMetricsSink::default();
        sink.record_pass(Trigger::Resync, PassOutcome::Succeeded);
        sink.record_status_write(StatusKind::Sync, true);
        assert_eq!(*sink.passes.lock(), vec![(Trigger::Resync, PassOutcome::Succeeded)]);
        assert_eq!(*sink.status_writes.lock(), vec![(StatusKind::Sync, true)]);
    }
}
