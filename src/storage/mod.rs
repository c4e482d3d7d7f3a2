//! Storage adapter abstraction and implementations
//!
//! Every backend implements [`StorageAdapter`]. Expected conditions (unknown
//! endpoint, empty content, missing material) are reported through the
//! `success` flag of the returned result; `Err` is reserved for
//! infrastructure faults such as a lost database connection.

mod database;
mod factory;
mod memory;
mod schema;
pub mod vector;

pub use database::{BackfillResult, DatabaseStorageAdapter};
pub use factory::{CapabilityProbe, SqliteVecProbe, StorageAdapterFactory};
pub use memory::InMemoryStorageAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::core::{Node, Relationship};
use crate::error::Result;

/// Which backend an adapter is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Durable SQLite store with vector similarity search
    Database,
    /// Volatile process-memory store
    Memory,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Database => "database",
            AdapterKind::Memory => "memory",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of storing one node
#[derive(Debug, Clone, Default)]
pub struct StoreNodeResult {
    pub success: bool,
    pub node: Option<Node>,
    pub error: Option<String>,
    /// Non-fatal degradation, e.g. stored without an embedding
    pub warning: Option<String>,
}

/// Result of storing a batch of nodes
#[derive(Debug, Clone, Default)]
pub struct BatchStoreResult {
    pub success: bool,
    /// Number of nodes written
    pub count: usize,
    /// Stored nodes, in input order
    pub nodes: Vec<Node>,
    pub error: Option<String>,
    /// Index of the entry that rejected the batch
    pub failed_index: Option<usize>,
    pub warnings: Vec<String>,
}

impl BatchStoreResult {
    pub(crate) fn rejected(index: usize, reason: String) -> Self {
        Self {
            success: false,
            error: Some(format!("node {}: {}", index, reason)),
            failed_index: Some(index),
            ..Default::default()
        }
    }
}

/// Result of storing one relationship
#[derive(Debug, Clone, Default)]
pub struct StoreRelationshipResult {
    pub success: bool,
    pub relationship: Option<Relationship>,
    pub error: Option<String>,
}

impl StoreRelationshipResult {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            relationship: None,
            error: Some(reason.into()),
        }
    }
}

/// Nodes of one material ordered by `chunk_index`
#[derive(Debug, Clone, Default)]
pub struct NodesResult {
    pub success: bool,
    pub nodes: Vec<Node>,
    pub error: Option<String>,
}

/// Result of deleting a material's graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub success: bool,
    /// Number of nodes removed
    pub deleted_count: usize,
    pub deleted_relationships: usize,
}

/// Aggregate statistics of a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub backend: AdapterKind,
    pub node_count: usize,
    pub relationship_count: usize,
    pub material_count: usize,
    pub embedded_node_count: usize,
}

impl GraphStats {
    pub fn empty(backend: AdapterKind) -> Self {
        Self {
            backend,
            node_count: 0,
            relationship_count: 0,
            material_count: 0,
            embedded_node_count: 0,
        }
    }
}

/// A node ranked by similarity
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub node: Node,
    pub score: f32,
}

/// Storage adapter trait
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> AdapterKind;

    /// Persist many nodes. Either every node is written or none is.
    async fn store_batch_nodes(&self, nodes: Vec<Node>) -> Result<BatchStoreResult>;

    /// Persist a relationship between two nodes of this backend
    async fn store_relationship(&self, relationship: Relationship)
        -> Result<StoreRelationshipResult>;

    /// Nodes of a material ordered by `chunk_index`, each carrying its
    /// outbound edges to the same material as `source_relationships`
    async fn get_nodes_by_material(&self, material_id: &str) -> Result<NodesResult>;

    /// Number of nodes stored for a material, without loading them
    async fn count_nodes_by_material(&self, material_id: &str) -> Result<usize>;

    /// Remove all nodes and relationships scoped to a material
    async fn delete_material_graph(&self, material_id: &str) -> Result<DeleteResult>;

    /// Get aggregate statistics
    async fn get_stats(&self) -> Result<GraphStats>;

    /// Rank embedded nodes by cosine similarity to `query_embedding`.
    /// Vectors of another length are skipped; an empty query or `k == 0`
    /// yields no hits.
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Persist one node
    async fn store_node(&self, node: Node) -> Result<StoreNodeResult> {
        let batch = self.store_batch_nodes(vec![node]).await?;
        Ok(StoreNodeResult {
            success: batch.success,
            node: batch.nodes.into_iter().next(),
            error: batch.error,
            warning: batch.warnings.into_iter().next(),
        })
    }
}

/// Outcome of writing one material's nodes and their edges
#[derive(Debug, Clone, Default)]
pub struct MaterialGraphOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// Stored nodes, in input order
    pub nodes: Vec<Node>,
    pub relationships_stored: usize,
    pub relationships_skipped: usize,
    /// Chunk indices that occurred more than once
    pub duplicate_chunk_indices: Vec<u32>,
    pub warnings: Vec<String>,
}

/// Write one material's nodes as a batch, then persist each node's
/// `source_relationships` against the ids the adapter assigned.
///
/// Edges are resolved through a `chunk_index -> id` map scoped to this call.
/// An edge pointing at a chunk index absent from the batch is skipped.
pub async fn store_material_graph(
    adapter: &dyn StorageAdapter,
    mut nodes: Vec<Node>,
) -> Result<MaterialGraphOutcome> {
    let mut outcome = MaterialGraphOutcome {
        success: true,
        ..Default::default()
    };
    if nodes.is_empty() {
        return Ok(outcome);
    }

    let edges: Vec<_> = nodes
        .iter_mut()
        .map(|node| (node.chunk_index, std::mem::take(&mut node.source_relationships)))
        .collect();

    let batch = adapter.store_batch_nodes(nodes).await?;
    outcome.warnings.extend(batch.warnings);
    if !batch.success {
        outcome.success = false;
        outcome.error = batch.error;
        return Ok(outcome);
    }

    let mut remap: HashMap<u32, String> = HashMap::with_capacity(batch.nodes.len());
    for node in &batch.nodes {
        if remap.contains_key(&node.chunk_index) {
            tracing::error!(
                material_id = %node.material_id,
                chunk_index = node.chunk_index,
                "Duplicate chunk index within material"
            );
            outcome.duplicate_chunk_indices.push(node.chunk_index);
        } else {
            remap.insert(node.chunk_index, node.id.clone());
        }
    }

    for (stored, (chunk_index, relationships)) in batch.nodes.iter().zip(edges) {
        for edge in relationships {
            let Some(target_id) = remap.get(&edge.target_chunk_index) else {
                tracing::warn!(
                    material_id = %stored.material_id,
                    source_chunk = chunk_index,
                    target_chunk = edge.target_chunk_index,
                    "Relationship target chunk not in material, skipping"
                );
                outcome.warnings.push(format!(
                    "chunk {} -> {}: target chunk not present",
                    chunk_index, edge.target_chunk_index
                ));
                outcome.relationships_skipped += 1;
                continue;
            };

            let relationship = Relationship::new(
                stored.id.clone(),
                target_id.clone(),
                edge.relationship_type,
                edge.weight,
            )
            .with_metadata(edge.metadata);

            let result = adapter.store_relationship(relationship).await?;
            if result.success {
                outcome.relationships_stored += 1;
            } else {
                outcome.warnings.push(format!(
                    "chunk {} -> {}: {}",
                    chunk_index,
                    edge.target_chunk_index,
                    result.error.unwrap_or_default()
                ));
                outcome.relationships_skipped += 1;
            }
        }
    }

    outcome.nodes = batch.nodes;
    Ok(outcome)
}
