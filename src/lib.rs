//! Parse-apply-watch reconciliation driver: the event- and timer-driven loop
//! that decides when a reconciliation pass runs, which sub-phase it performs,
//! and how failures are cached, retried, and reported.
//!
//! Source fetching, hydration, the declarative parser, the applier, and the
//! watch/remediation subsystem are external collaborators; this crate only
//! orchestrates them through the traits in [`source`], [`render`], [`files`],
//! [`parser`], [`applier`], [`status`], and [`conflict`].

pub mod applier;
pub mod conflict;
pub mod driver;
pub mod errors;
pub mod files;
pub mod metrics;
pub mod parser;
pub mod periodic;
pub mod render;
pub mod source;
pub mod state;
pub mod status;
pub mod timers;

use std::sync::Arc;
use std::time::Duration;

pub use driver::{Driver, NoWatch, WatchCollaborator};

/// Cluster-root reconcilers own a RootSync and may write remediator status
/// onto other RootSyncs during conflict routing; namespaced reconcilers own
/// a RepoSync and never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ClusterRoot,
    Namespaced,
}

/// Bundles every pluggable collaborator plus the run loop's tunables,
/// mirroring `kube-runtime`'s `Context<T>`: a single cheaply-constructed
/// aggregate the driver is built from once at startup.
pub struct Options {
    pub reconciler_name: String,
    pub scope: Scope,
    pub source_reader: Arc<dyn source::SourceReader>,
    pub render_gate: Arc<dyn render::RenderGate>,
    pub file_loader: Arc<dyn files::FileLoader>,
    pub parser: Arc<dyn parser::Parser>,
    pub applier: Arc<dyn applier::Applier>,
    pub status_publisher: Arc<dyn status::StatusPublisher>,
    pub conflict_reporter: Arc<dyn conflict::ConflictReporter>,
    pub watch: Arc<dyn WatchCollaborator>,
    pub metrics: Arc<dyn metrics::MetricsSink>,
    pub tunables: Tunables,
}

/// Durations and caps the run loop and status publisher are parameterized
/// over. `Default` matches the conventional literals this driver is tuned
/// around (`base=5s, cap=60s, pollingPeriod=15s, statusUpdatePeriod=5s`).
#[derive(Debug, Clone)]
pub struct Tunables {
    pub poll_period: Duration,
    pub resync_period: Duration,
    pub status_update_period: Duration,
    /// How often the `retry` timer wakes to re-check its three conditional
    /// triggers (management conflict / ready-to-retry / watch update).
    /// Defaults to `retry_base` since both are about how eagerly the driver
    /// re-examines a failed pass.
    pub retry_check_period: Duration,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Minimum age `lastUpdate` must reach before an otherwise-unchanged
    /// status is rewritten just to avoid looking abandoned.
    pub status_min_rewrite_interval: Duration,
    /// Capacity bound on a RootSync's remediator-errors list.
    pub conflict_denominator: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        let retry_base = Duration::from_secs(5);
        Self {
            poll_period: Duration::from_secs(15),
            resync_period: Duration::from_secs(15 * 60),
            status_update_period: Duration::from_secs(5),
            retry_check_period: retry_base,
            retry_base,
            retry_cap: Duration::from_secs(60),
            status_min_rewrite_interval: Duration::from_secs(60),
            conflict_denominator: 5,
        }
    }
}
