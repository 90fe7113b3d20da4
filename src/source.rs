//! Source Reader collaborator: resolves the current commit and sync directory
//! from the shared filesystem populated by an external sync sidecar.

use crate::errors::SourceReadError;
use crate::state::{Commit, SyncDir};
use async_trait::async_trait;

/// `SourceCommitAndDir(sourceType, sourceDir, syncDir, reconcilerName) -> (commit, absSyncDir, errs)`.
///
/// Fetching itself (git/oci/helm) is out of scope; this trait is the seam the
/// driver calls through once per pass.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn source_commit_and_dir(&self, reconciler_name: &str) -> Result<(Commit, SyncDir), SourceReadError>;
}
