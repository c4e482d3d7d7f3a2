//! One-way transfer of an in-memory graph into a durable backend
//!
//! Every run writes a backup snapshot of the source before touching the
//! target. Materials are transferred one at a time; a failing material is
//! recorded and the run moves on. Rollback and restore are separate
//! operator actions, never triggered automatically.

mod backup;
mod report;

pub use backup::BackupSnapshot;
pub use report::{MaterialError, MigrationResult, RollbackResult, Verification};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::storage::{
    store_material_graph, InMemoryStorageAdapter, MaterialGraphOutcome, StorageAdapter,
};

/// Options for a single migration run
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    /// Stop after the backup and report source statistics only
    pub dry_run: bool,
}

/// Moves graphs from an in-memory adapter into `target`
pub struct MigrationService {
    target: Arc<dyn StorageAdapter>,
    config: MigrationConfig,
}

impl MigrationService {
    pub fn new(target: Arc<dyn StorageAdapter>, config: MigrationConfig) -> Self {
        Self { target, config }
    }

    /// Migrate every material of `source` into the target.
    ///
    /// Fails only when the backup cannot be written or the source cannot be
    /// read; per-material failures end up in [`MigrationResult::errors`].
    pub async fn migrate(
        &self,
        source: &InMemoryStorageAdapter,
        options: MigrationOptions,
    ) -> Result<MigrationResult> {
        let start = Instant::now();

        let snapshot = BackupSnapshot::capture(source).await?;
        let backup_path = snapshot.write(&self.config.backup_dir).await?;
        let source_stats = snapshot.stats.clone();
        drop(snapshot);

        let mut result = MigrationResult {
            success: true,
            dry_run: options.dry_run,
            migrated_nodes: 0,
            migrated_relationships: 0,
            skipped_relationships: 0,
            migrated_materials: Vec::new(),
            errors: Vec::new(),
            verification: None,
            source_stats,
            duration_ms: 0,
            backup_path,
        };

        if result.source_stats.node_count == 0 {
            tracing::info!("Source graph is empty, nothing to migrate");
            result.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(result);
        }

        if options.dry_run {
            tracing::info!(
                nodes = result.source_stats.node_count,
                relationships = result.source_stats.relationship_count,
                materials = result.source_stats.material_count,
                "Dry run, target left untouched"
            );
            result.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(result);
        }

        let target_kind = self.target.kind();
        tracing::info!(
            materials = result.source_stats.material_count,
            target = %target_kind,
            "Starting migration"
        );

        for material_id in source.material_ids() {
            match self.transfer_material(source, &material_id).await {
                Ok(Some(outcome)) => {
                    tracing::debug!(
                        material_id = %material_id,
                        nodes = outcome.nodes.len(),
                        relationships = outcome.relationships_stored,
                        "Material migrated"
                    );
                    result.migrated_nodes += outcome.nodes.len();
                    result.migrated_relationships += outcome.relationships_stored;
                    result.skipped_relationships += outcome.relationships_skipped;
                    result.migrated_materials.push(material_id);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(material_id = %material_id, error = %error, "Material migration failed");
                    result.errors.push(MaterialError { material_id, error });
                }
            }
        }

        result.verification = Some(self.verify(&result).await);
        result.success = result.errors.is_empty();
        result.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            success = result.success,
            nodes = result.migrated_nodes,
            relationships = result.migrated_relationships,
            failed_materials = result.errors.len(),
            duration_ms = result.duration_ms,
            "Migration finished"
        );
        Ok(result)
    }

    /// Transfer one material. `Ok(None)` means there was nothing to move.
    ///
    /// A material the target already holds nodes for is refused rather than
    /// deduplicated: a previous run may have left it partially written, and
    /// only `rollback` followed by a fresh run restores a known state. The
    /// node count is the one read of the target besides verification stats.
    async fn transfer_material(
        &self,
        source: &InMemoryStorageAdapter,
        material_id: &str,
    ) -> std::result::Result<Option<MaterialGraphOutcome>, String> {
        let existing = self
            .target
            .count_nodes_by_material(material_id)
            .await
            .map_err(|e| e.to_string())?;
        if existing > 0 {
            return Err(format!(
                "{} nodes already present in target; roll back first",
                existing
            ));
        }

        let fetched = source
            .get_nodes_by_material(material_id)
            .await
            .map_err(|e| e.to_string())?;
        if !fetched.success {
            return Err(fetched.error.unwrap_or_else(|| "source read failed".to_string()));
        }
        if fetched.nodes.is_empty() {
            return Ok(None);
        }

        let nodes = fetched.nodes.iter().map(|n| n.detached()).collect();
        let outcome = store_material_graph(self.target.as_ref(), nodes)
            .await
            .map_err(|e| e.to_string())?;

        if !outcome.success {
            return Err(outcome
                .error
                .unwrap_or_else(|| "batch write rejected".to_string()));
        }
        for warning in &outcome.warnings {
            tracing::warn!(material_id, warning = %warning, "Migration warning");
        }
        Ok(Some(outcome))
    }

    async fn verify(&self, result: &MigrationResult) -> Verification {
        let expected_nodes = result.source_stats.node_count;
        let expected_relationships = result.source_stats.relationship_count;
        let mut issues = Vec::new();

        if result.migrated_nodes != expected_nodes {
            issues.push(format!(
                "node count mismatch: expected {}, migrated {}",
                expected_nodes, result.migrated_nodes
            ));
        }
        if result.migrated_relationships != expected_relationships {
            issues.push(format!(
                "relationship count mismatch: expected {}, migrated {}",
                expected_relationships, result.migrated_relationships
            ));
        }

        let target_stats = match self.target.get_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                issues.push(format!("target stats unavailable: {}", e));
                None
            }
        };

        for issue in &issues {
            tracing::warn!(issue = %issue, "Migration verification issue");
        }

        Verification {
            expected_nodes,
            expected_relationships,
            migrated_nodes: result.migrated_nodes,
            migrated_relationships: result.migrated_relationships,
            target_stats,
            passed: issues.is_empty(),
            issues,
        }
    }

    /// Delete the graphs of `material_ids` from the target
    pub async fn rollback(&self, material_ids: &[String]) -> RollbackResult {
        let mut result = RollbackResult::default();

        for material_id in material_ids {
            match self.target.delete_material_graph(material_id).await {
                Ok(deleted) if deleted.success => {
                    tracing::info!(
                        material_id = %material_id,
                        nodes = deleted.deleted_count,
                        relationships = deleted.deleted_relationships,
                        "Rolled back material"
                    );
                    result.total_deleted += deleted.deleted_count;
                    result.deleted.push((material_id.clone(), deleted.deleted_count));
                }
                Ok(_) => result.errors.push(MaterialError {
                    material_id: material_id.clone(),
                    error: "delete reported failure".to_string(),
                }),
                Err(e) => {
                    tracing::error!(material_id = %material_id, error = %e, "Rollback failed");
                    result.errors.push(MaterialError {
                        material_id: material_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.success = result.errors.is_empty();
        result
    }

    /// Rebuild an in-memory adapter from a backup file
    pub async fn restore(path: &Path) -> Result<InMemoryStorageAdapter> {
        let snapshot = BackupSnapshot::read(path).await?;
        tracing::info!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            relationships = snapshot.relationships.len(),
            "Restoring backup"
        );
        snapshot.into_adapter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Node;
    use crate::storage::{AdapterKind, GraphStats};

    fn service(dir: &Path) -> (MigrationService, Arc<InMemoryStorageAdapter>) {
        let target = Arc::new(InMemoryStorageAdapter::new());
        let config = MigrationConfig {
            backup_dir: dir.to_path_buf(),
        };
        (MigrationService::new(target.clone(), config), target)
    }

    async fn source() -> InMemoryStorageAdapter {
        let adapter = InMemoryStorageAdapter::new();
        store_material_graph(
            &adapter,
            vec![
                Node::new("c1", "m1", 0, "a").relate_to(2, "supports", 0.5),
                Node::new("c1", "m1", 1, "b"),
                Node::new("c1", "m1", 2, "c"),
            ],
        )
        .await
        .unwrap();
        store_material_graph(&adapter, vec![Node::new("c1", "m2", 0, "d")])
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_migrate_memory_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let (service, target) = service(dir.path());

        let result = service
            .migrate(&source().await, MigrationOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.migrated_nodes, 4);
        assert_eq!(result.migrated_relationships, 1);
        assert_eq!(result.migrated_materials, vec!["m1", "m2"]);
        assert!(result.verification.as_ref().unwrap().passed);
        assert!(result.backup_path.exists());
        assert_eq!(target.get_stats().await.unwrap().node_count, 4);
    }

    #[tokio::test]
    async fn test_migrate_rerun_requires_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let (service, target) = service(dir.path());
        let source = source().await;

        service
            .migrate(&source, MigrationOptions::default())
            .await
            .unwrap();
        let rerun = service
            .migrate(&source, MigrationOptions::default())
            .await
            .unwrap();

        assert!(!rerun.success);
        assert_eq!(rerun.errors.len(), 2);
        assert!(rerun.errors[0].error.contains("roll back first"));
        assert_eq!(target.get_stats().await.unwrap().node_count, 4);

        let rollback = service.rollback(&["m1".to_string()]).await;
        assert!(rollback.success);
        assert_eq!(rollback.total_deleted, 3);

        let retry = service
            .migrate(&source, MigrationOptions::default())
            .await
            .unwrap();
        assert_eq!(retry.migrated_materials, vec!["m1"]);
        assert_eq!(retry.errors.len(), 1);
        assert_eq!(retry.errors[0].material_id, "m2");
    }

    #[tokio::test]
    async fn test_migrate_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let (service, target) = service(dir.path());

        let result = service
            .migrate(&source().await, MigrationOptions { dry_run: true })
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.dry_run);
        assert!(result.verification.is_none());
        assert_eq!(result.source_stats.node_count, 4);
        assert!(result.backup_path.exists());
        assert_eq!(
            target.get_stats().await.unwrap(),
            GraphStats::empty(AdapterKind::Memory)
        );
    }

    #[tokio::test]
    async fn test_migrate_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path());

        let result = service
            .migrate(&InMemoryStorageAdapter::new(), MigrationOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.migrated_nodes, 0);
        assert!(result.verification.is_none());
        assert!(result.backup_path.exists());
    }

    #[tokio::test]
    async fn test_migrate_backup_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let (service, target) = service(&blocker.join("backups"));

        let result = service
            .migrate(&source().await, MigrationOptions::default())
            .await;
        assert!(matches!(result, Err(crate::A3SError::Backup(_))));
        assert_eq!(target.get_stats().await.unwrap().node_count, 0);
    }

    #[tokio::test]
    async fn test_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path());
        let source = source().await;

        let result = service
            .migrate(&source, MigrationOptions { dry_run: true })
            .await
            .unwrap();
        let restored = MigrationService::restore(&result.backup_path).await.unwrap();
        assert_eq!(
            restored.get_stats().await.unwrap(),
            source.get_stats().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_rollback_unknown_material() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path());

        let result = service.rollback(&["ghost".to_string()]).await;
        assert!(result.success);
        assert_eq!(result.total_deleted, 0);
        assert_eq!(result.deleted, vec![("ghost".to_string(), 0)]);
    }
}
