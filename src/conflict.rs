//! Conflict Reporter: routes management-conflict errors produced by Apply to
//! the RootSync that manages the conflicting object.

use crate::applier::{ManagerScope, SyncErrorEntry};
use crate::errors::ConflictWriteError;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait ConflictReporter: Send + Sync {
    /// `prependRootSyncRemediatorStatus(ctx, client, targetRootSyncName, errs, denominator)`.
    async fn prepend_root_sync_remediator_status(
        &self,
        target_root_sync_name: &str,
        errs: &[crate::errors::ReconcileErrorMessage],
        denominator: u32,
    ) -> Result<(), ConflictWriteError>;
}

/// Groups `errs` by conflicting manager and routes each group: cluster-root
/// managers get their errors prepended (deduplicated) to the named RootSync's
/// remediator-errors field; namespaced managers are only
/// logged, since a reconciler cannot safely write another namespaced
/// reconciler's status. Returns write failures for the caller to fold into
/// the pass's overall errors alongside the original apply errors.
pub async fn route_conflicts(
    reporter: &dyn ConflictReporter,
    conflicts: &[SyncErrorEntry],
    denominator: u32,
) -> Vec<ConflictWriteError> {
    let mut by_manager: std::collections::BTreeMap<(bool, String), Vec<&SyncErrorEntry>> = Default::default();
    for entry in conflicts {
        let Some(manager) = &entry.conflict else { continue };
        let is_root = matches!(manager.scope, ManagerScope::ClusterRoot);
        by_manager.entry((is_root, manager.name.clone())).or_default().push(entry);
    }

    let mut failures = Vec::new();
    for ((is_root, manager_name), entries) in by_manager {
        if !is_root {
            tracing::warn!(
                manager = %manager_name,
                count = entries.len(),
                "management conflict against namespaced reconciler, logging only"
            );
            continue;
        }
        let mut seen = HashSet::new();
        let deduped: Vec<_> = entries
            .into_iter()
            .filter(|e| seen.insert((e.message.code.clone(), e.message.message.clone())))
            .map(|e| e.message.clone())
            .collect();
        if let Err(e) = reporter
            .prepend_root_sync_remediator_status(&manager_name, &deduped, denominator)
            .await
        {
            tracing::warn!(target = %manager_name, error = %e, "failed to write remediator status");
            failures.push(e);
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReconcileErrorMessage;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingReporter {
        calls: Arc<Mutex<Vec<(String, usize)>>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl ConflictReporter for RecordingReporter {
        async fn prepend_root_sync_remediator_status(
            &self,
            target_root_sync_name: &str,
            errs: &[ReconcileErrorMessage],
            _denominator: u32,
        ) -> Result<(), ConflictWriteError> {
            self.calls.lock().push((target_root_sync_name.to_string(), errs.len()));
            if self.fail_for.as_deref() == Some(target_root_sync_name) {
                return Err(ConflictWriteError::Write {
                    target: target_root_sync_name.to_string(),
                    source: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn conflict_entry(scope: ManagerScope, name: &str, msg: &str) -> SyncErrorEntry {
        SyncErrorEntry {
            message: ReconcileErrorMessage::new("conflict", msg),
            conflict: Some(crate::applier::ConflictingManager {
                scope,
                name: name.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn routes_cluster_root_conflicts_and_logs_namespaced_only() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reporter = RecordingReporter {
            calls: calls.clone(),
            fail_for: None,
        };
        let errs = vec![
            conflict_entry(ManagerScope::ClusterRoot, "root-b", "object X owned by root-b"),
            conflict_entry(ManagerScope::Namespaced, "ns-team-a", "object Y owned by ns-team-a"),
        ];
        let failures = route_conflicts(&reporter, &errs, 5).await;
        assert!(failures.is_empty());
        assert_eq!(*calls.lock(), vec![("root-b".to_string(), 1)]);
    }

    #[tokio::test]
    async fn dedups_identical_errors_within_a_group() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reporter = RecordingReporter {
            calls: calls.clone(),
            fail_for: None,
        };
        let errs = vec![
            conflict_entry(ManagerScope::ClusterRoot, "root-b", "same"),
            conflict_entry(ManagerScope::ClusterRoot, "root-b", "same"),
        ];
        route_conflicts(&reporter, &errs, 5).await;
        assert_eq!(*calls.lock(), vec![("root-b".to_string(), 1)]);
    }

    #[tokio::test]
    async fn write_failure_is_surfaced_to_caller() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reporter = RecordingReporter {
            calls,
            fail_for: Some("root-b".to_string()),
        };
        let errs = vec![conflict_entry(ManagerScope::ClusterRoot, "root-b", "x")];
        let failures = route_conflicts(&reporter, &errs, 5).await;
        assert_eq!(failures.len(), 1);
    }
}
