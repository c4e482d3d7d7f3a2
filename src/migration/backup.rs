//! Backup snapshots of an in-memory graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::{Node, Relationship};
use crate::error::{A3SError, Result};
use crate::storage::{GraphStats, InMemoryStorageAdapter, StorageAdapter};

const BACKUP_PREFIX: &str = "graph-backup-";

/// Complete state of an in-memory adapter at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub timestamp: DateTime<Utc>,
    pub stats: GraphStats,
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
}

impl BackupSnapshot {
    /// Capture every node and relationship of `source`
    pub async fn capture(source: &InMemoryStorageAdapter) -> Result<Self> {
        let stats = source.get_stats().await?;
        let (nodes, relationships) = source.snapshot();
        Ok(Self {
            timestamp: Utc::now(),
            stats,
            nodes,
            relationships,
        })
    }

    /// Write the snapshot to a new file under `dir` and return its path.
    /// Existing files are never overwritten.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| A3SError::Backup(format!("{}: {}", dir.display(), e)))?;
        let content = serde_json::to_vec_pretty(self)?;

        let mut stamp = self.timestamp.timestamp_millis();
        loop {
            let path = dir.join(format!("{}{}.json", BACKUP_PREFIX, stamp));
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(&content)
                        .await
                        .map_err(|e| A3SError::Backup(format!("{}: {}", path.display(), e)))?;
                    file.sync_all()
                        .await
                        .map_err(|e| A3SError::Backup(format!("{}: {}", path.display(), e)))?;
                    tracing::info!(
                        path = %path.display(),
                        nodes = self.nodes.len(),
                        relationships = self.relationships.len(),
                        "Backup written"
                    );
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => {
                    return Err(A3SError::Backup(format!("{}: {}", path.display(), e)));
                }
            }
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| A3SError::Backup(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| A3SError::Backup(format!("{}: {}", path.display(), e)))
    }

    /// Replay the snapshot into a fresh adapter, preserving identities
    pub fn into_adapter(self) -> Result<InMemoryStorageAdapter> {
        InMemoryStorageAdapter::from_parts(self.nodes, self.relationships)
    }
}
