//! Applier Collaborator: pushes declared objects to the cluster and returns
//! sync errors. Talking to the API server itself is out of scope for this
//! crate; this is purely the seam the driver calls through and polls during Apply.

use crate::errors::ReconcileErrorMessage;
use crate::state::ParsedObjects;
use async_trait::async_trait;

/// One sync error as returned by Apply. `conflict` carries the
/// `(conflictingManagerScope, conflictingManagerName)` pair when this entry
/// represents a management conflict, so the driver can route it to the
/// Conflict Reporter without re-parsing the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncErrorEntry {
    pub message: ReconcileErrorMessage,
    pub conflict: Option<ConflictingManager>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingManager {
    pub scope: ManagerScope,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerScope {
    ClusterRoot,
    Namespaced,
}

#[async_trait]
pub trait Applier: Send + Sync {
    /// `Update(ctx, cacheHandle) -> errs`.
    async fn update(&self, objects: &ParsedObjects) -> Vec<SyncErrorEntry>;

    /// Safe to call concurrently while `update` is in flight — backs the
    /// periodic sync-status publisher.
    fn syncing(&self) -> bool;

    /// Safe to call concurrently while `update` is in flight.
    fn sync_errors(&self) -> Vec<SyncErrorEntry>;
}
