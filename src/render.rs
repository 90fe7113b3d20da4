//! Render Gate: decides whether hydrated output is available for the current
//! commit by inspecting a done-marker file.
//!
//! The done-marker's contents are the ASCII commit ID that completed
//! hydration. The gate has no other side channel — this lets hydration and
//! reconciliation coordinate purely through the filesystem.

use crate::errors::RenderError;
use crate::state::Commit;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Marker absent, or present for a different commit than the one being reconciled.
    InProgress,
    /// Marker present, matches the current commit, hydrated directory exists.
    Succeeded,
    /// Marker present, matches, but the hydrated directory is absent — raw source is authoritative.
    Skipped,
}

/// `evaluate(commit) -> RenderOutcome`. A stat failure that isn't "marker
/// missing" is surfaced as `Err` rather than folded into `InProgress`: the
/// caller turns that into a `Failed` rendering status instead of waiting.
pub trait RenderGate: Send + Sync {
    fn evaluate(&self, commit: &Commit) -> Result<RenderOutcome, RenderError>;
}

/// Reads `${repoRoot}/${DoneFile}` and checks for `${repoRoot}/hydrated/${link}`.
pub struct FsRenderGate {
    pub done_marker_path: PathBuf,
    pub hydrated_dir: PathBuf,
}

impl RenderGate for FsRenderGate {
    fn evaluate(&self, commit: &Commit) -> Result<RenderOutcome, RenderError> {
        let marker = match std::fs::read_to_string(&self.done_marker_path) {
            Ok(contents) => Some(Commit(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RenderError::StatFailed(e)),
        };
        let hydrated_exists = self.hydrated_dir.is_dir();
        Ok(decide(marker.as_ref(), commit, hydrated_exists))
    }
}

/// Pure decision function, split out from I/O so it's directly unit-testable.
fn decide(marker: Option<&Commit>, current: &Commit, hydrated_dir_exists: bool) -> RenderOutcome {
    match marker {
        None => RenderOutcome::InProgress,
        Some(marker_commit) if marker_commit != current => RenderOutcome::InProgress,
        Some(_) if hydrated_dir_exists => RenderOutcome::Succeeded,
        Some(_) => RenderOutcome::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_absent_is_in_progress() {
        let c1 = Commit::from("c1");
        assert_eq!(decide(None, &c1, true), RenderOutcome::InProgress);
    }

    #[test]
    fn marker_wrong_commit_is_in_progress_even_if_hydrated_exists() {
        let c0 = Commit::from("c0");
        let c1 = Commit::from("c1");
        assert_eq!(decide(Some(&c0), &c1, true), RenderOutcome::InProgress);
    }

    #[test]
    fn marker_matches_and_hydrated_present_is_succeeded() {
        let c1 = Commit::from("c1");
        assert_eq!(decide(Some(&c1), &c1, true), RenderOutcome::Succeeded);
    }

    #[test]
    fn marker_matches_but_hydrated_missing_is_skipped() {
        let c1 = Commit::from("c1");
        assert_eq!(decide(Some(&c1), &c1, false), RenderOutcome::Skipped);
    }
}
