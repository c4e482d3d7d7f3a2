//! Migration and rollback result objects

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::GraphStats;

/// A material whose transfer failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialError {
    pub material_id: String,
    pub error: String,
}

/// Post-transfer comparison of source and migrated counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Source node count captured before transfer
    pub expected_nodes: usize,
    /// Source relationship count captured before transfer
    pub expected_relationships: usize,
    pub migrated_nodes: usize,
    pub migrated_relationships: usize,
    /// Target statistics read after transfer
    pub target_stats: Option<GraphStats>,
    pub issues: Vec<String>,
    pub passed: bool,
}

/// Summary of one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// True when no material failed
    pub success: bool,
    pub dry_run: bool,
    pub migrated_nodes: usize,
    pub migrated_relationships: usize,
    /// Edges dropped because their target chunk could not be resolved
    pub skipped_relationships: usize,
    pub migrated_materials: Vec<String>,
    pub errors: Vec<MaterialError>,
    pub verification: Option<Verification>,
    pub source_stats: GraphStats,
    pub duration_ms: u64,
    pub backup_path: PathBuf,
}

impl MigrationResult {
    /// Generate a human-readable Markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (Dry Run)" } else { "" };
        let status = if self.success { "success" } else { "partial" };

        out.push_str(&format!("# Graph Migration Report{}\n\n", mode));

        out.push_str("## Summary\n\n");
        out.push_str(&format!("- Status: {}\n", status));
        out.push_str(&format!("- Backup: `{}`\n", self.backup_path.display()));
        out.push_str(&format!(
            "- Source: {} nodes, {} relationships, {} materials\n",
            self.source_stats.node_count,
            self.source_stats.relationship_count,
            self.source_stats.material_count
        ));
        out.push_str(&format!(
            "- Migrated: {} nodes, {} relationships, {} materials\n",
            self.migrated_nodes,
            self.migrated_relationships,
            self.migrated_materials.len()
        ));
        if self.skipped_relationships > 0 {
            out.push_str(&format!(
                "- Skipped relationships: {}\n",
                self.skipped_relationships
            ));
        }
        out.push_str(&format!("- Duration: {} ms\n\n", self.duration_ms));

        if !self.errors.is_empty() {
            out.push_str("## Failed Materials\n\n");
            out.push_str("| Material | Error |\n");
            out.push_str("|----------|-------|\n");
            for e in &self.errors {
                out.push_str(&format!("| {} | {} |\n", e.material_id, e.error));
            }
            out.push('\n');
        }

        if let Some(v) = &self.verification {
            out.push_str("## Verification\n\n");
            out.push_str("| | Expected | Migrated |\n");
            out.push_str("|---|---|---|\n");
            out.push_str(&format!(
                "| Nodes | {} | {} |\n",
                v.expected_nodes, v.migrated_nodes
            ));
            out.push_str(&format!(
                "| Relationships | {} | {} |\n\n",
                v.expected_relationships, v.migrated_relationships
            ));
            if v.passed {
                out.push_str("Counts match.\n\n");
            } else {
                for issue in &v.issues {
                    out.push_str(&format!("- {issue}\n"));
                }
                out.push('\n');
            }
        }

        if !self.success || self.verification.as_ref().is_some_and(|v| !v.passed) {
            out.push_str("## Next Steps\n\n");
            out.push_str("1. Inspect the failed materials above\n");
            out.push_str("2. Roll back affected materials: `a3s-graph rollback <material_id>...`\n");
            out.push_str("3. Re-run the migration from the backup file\n");
        }

        out
    }
}

/// Outcome of deleting migrated materials from the target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    /// Nodes removed across all materials
    pub total_deleted: usize,
    /// `(material_id, nodes removed)` per material, in request order
    pub deleted: Vec<(String, usize)>,
    pub errors: Vec<MaterialError>,
}
