//! In-memory storage implementation
//!
//! State lives for the lifetime of the adapter instance only. Callers that
//! need durability migrate into a [`super::DatabaseStorageAdapter`] once one
//! is available.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use uuid::Uuid;

use crate::core::{Node, Relationship, SourceRelationship};
use crate::error::{A3SError, Result};

use super::vector::cosine_similarity;
use super::{
    AdapterKind, BatchStoreResult, DeleteResult, GraphStats, NodesResult, SearchHit,
    StorageAdapter, StoreRelationshipResult,
};

#[derive(Default)]
struct MemoryState {
    nodes: HashMap<String, Node>,
    /// material id -> node ids in insertion order
    materials: HashMap<String, Vec<String>>,
    relationships: HashMap<String, Relationship>,
    /// node id -> ids of relationships leaving it
    outbound: HashMap<String, Vec<String>>,
    /// node id -> ids of relationships entering it
    inbound: HashMap<String, Vec<String>>,
    embedded: usize,
}

impl MemoryState {
    fn insert_node(&mut self, node: Node) {
        if node.is_embedded() {
            self.embedded += 1;
        }
        self.materials
            .entry(node.material_id.clone())
            .or_default()
            .push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    fn insert_relationship(&mut self, relationship: Relationship) {
        self.outbound
            .entry(relationship.source_node_id.clone())
            .or_default()
            .push(relationship.id.clone());
        self.inbound
            .entry(relationship.target_node_id.clone())
            .or_default()
            .push(relationship.id.clone());
        self.relationships
            .insert(relationship.id.clone(), relationship);
    }

    fn remove_relationship(&mut self, id: &str) -> bool {
        let Some(rel) = self.relationships.remove(id) else {
            return false;
        };
        if let Some(ids) = self.outbound.get_mut(&rel.source_node_id) {
            ids.retain(|r| r != id);
        }
        if let Some(ids) = self.inbound.get_mut(&rel.target_node_id) {
            ids.retain(|r| r != id);
        }
        true
    }
}

/// Volatile, process-lifetime graph store
#[derive(Default)]
pub struct InMemoryStorageAdapter {
    state: RwLock<MemoryState>,
}

impl InMemoryStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an adapter from previously captured nodes and relationships,
    /// keeping their identities.
    pub fn from_parts(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Result<Self> {
        let mut state = MemoryState::default();

        for node in nodes {
            if node.id.is_empty() {
                return Err(A3SError::Backup(format!(
                    "node without id (material {}, chunk {})",
                    node.material_id, node.chunk_index
                )));
            }
            if state.nodes.contains_key(&node.id) {
                return Err(A3SError::Backup(format!("duplicate node id {}", node.id)));
            }
            state.insert_node(node);
        }

        for relationship in relationships {
            if !state.nodes.contains_key(&relationship.source_node_id)
                || !state.nodes.contains_key(&relationship.target_node_id)
            {
                return Err(A3SError::Backup(format!(
                    "relationship {} references a missing node",
                    relationship.id
                )));
            }
            state.insert_relationship(relationship);
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Full copy of the current state: nodes ordered by material and chunk
    /// index, relationships ordered by creation time.
    pub fn snapshot(&self) -> (Vec<Node>, Vec<Relationship>) {
        let state = self.state.read();

        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.material_id
                .cmp(&b.material_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(a.id.cmp(&b.id))
        });

        let mut relationships: Vec<Relationship> =
            state.relationships.values().cloned().collect();
        relationships.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        (nodes, relationships)
    }

    /// Ids of all materials currently held, sorted
    pub fn material_ids(&self) -> Vec<String> {
        let state = self.state.read();
        let mut ids: Vec<String> = state
            .materials
            .iter()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorageAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn store_batch_nodes(&self, nodes: Vec<Node>) -> Result<BatchStoreResult> {
        if let Some((index, reason)) = nodes
            .iter()
            .enumerate()
            .find_map(|(i, n)| n.validation_error().map(|e| (i, e)))
        {
            return Ok(BatchStoreResult::rejected(index, reason));
        }

        let mut stored = Vec::with_capacity(nodes.len());
        let mut state = self.state.write();
        for mut node in nodes {
            node.id = Uuid::new_v4().to_string();
            node.source_relationships.clear();
            state.insert_node(node.clone());
            stored.push(node);
        }

        Ok(BatchStoreResult {
            success: true,
            count: stored.len(),
            nodes: stored,
            ..Default::default()
        })
    }

    async fn store_relationship(
        &self,
        mut relationship: Relationship,
    ) -> Result<StoreRelationshipResult> {
        if let Some(reason) = relationship.validation_error() {
            return Ok(StoreRelationshipResult::rejected(reason));
        }

        let mut state = self.state.write();
        for endpoint in [&relationship.source_node_id, &relationship.target_node_id] {
            if !state.nodes.contains_key(endpoint) {
                return Ok(StoreRelationshipResult::rejected(format!(
                    "unknown node id {}",
                    endpoint
                )));
            }
        }

        relationship.id = Uuid::new_v4().to_string();
        state.insert_relationship(relationship.clone());

        Ok(StoreRelationshipResult {
            success: true,
            relationship: Some(relationship),
            error: None,
        })
    }

    async fn get_nodes_by_material(&self, material_id: &str) -> Result<NodesResult> {
        let state = self.state.read();
        let Some(ids) = state.materials.get(material_id) else {
            return Ok(NodesResult {
                success: true,
                ..Default::default()
            });
        };

        let chunk_of: HashMap<&str, u32> = ids
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .map(|n| (n.id.as_str(), n.chunk_index))
            .collect();

        let mut nodes: Vec<Node> = ids
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .map(|node| {
                let mut node = node.clone();
                node.source_relationships = state
                    .outbound
                    .get(&node.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|rel_id| state.relationships.get(rel_id))
                    .filter_map(|rel| {
                        chunk_of
                            .get(rel.target_node_id.as_str())
                            .map(|&target_chunk_index| SourceRelationship {
                                target_chunk_index,
                                relationship_type: rel.relationship_type.clone(),
                                weight: rel.weight,
                                metadata: rel.metadata.clone(),
                            })
                    })
                    .collect();
                node
            })
            .collect();

        // Stable: duplicates keep insertion order.
        nodes.sort_by_key(|n| n.chunk_index);

        Ok(NodesResult {
            success: true,
            nodes,
            error: None,
        })
    }

    async fn count_nodes_by_material(&self, material_id: &str) -> Result<usize> {
        Ok(self
            .state
            .read()
            .materials
            .get(material_id)
            .map_or(0, Vec::len))
    }

    async fn delete_material_graph(&self, material_id: &str) -> Result<DeleteResult> {
        let mut state = self.state.write();
        let Some(ids) = state.materials.remove(material_id) else {
            return Ok(DeleteResult {
                success: true,
                ..Default::default()
            });
        };

        let mut deleted_relationships = 0;
        for id in &ids {
            let mut rel_ids = state.outbound.remove(id).unwrap_or_default();
            rel_ids.extend(state.inbound.remove(id).unwrap_or_default());
            for rel_id in rel_ids {
                if state.remove_relationship(&rel_id) {
                    deleted_relationships += 1;
                }
            }
        }

        let mut deleted_count = 0;
        for id in &ids {
            if let Some(node) = state.nodes.remove(id) {
                if node.is_embedded() {
                    state.embedded -= 1;
                }
                deleted_count += 1;
            }
        }

        tracing::debug!(
            material_id,
            deleted_count,
            deleted_relationships,
            "Deleted material graph from memory"
        );

        Ok(DeleteResult {
            success: true,
            deleted_count,
            deleted_relationships,
        })
    }

    async fn get_stats(&self) -> Result<GraphStats> {
        let state = self.state.read();
        Ok(GraphStats {
            backend: AdapterKind::Memory,
            node_count: state.nodes.len(),
            relationship_count: state.relationships.len(),
            material_count: state.materials.values().filter(|ids| !ids.is_empty()).count(),
            embedded_node_count: state.embedded,
        })
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let mut heap = BinaryHeap::new();

        for node in state.nodes.values() {
            // Vectors of another dimension are not comparable.
            let Some(embedding) = node
                .embedding
                .as_deref()
                .filter(|e| e.len() == query_embedding.len())
            else {
                continue;
            };
            let score = cosine_similarity(query_embedding, embedding);
            heap.push((OrderedFloat(score), Reverse(node.id.as_str())));
        }

        let mut results = Vec::with_capacity(k.min(heap.len()));
        while results.len() < k {
            let Some((score, Reverse(id))) = heap.pop() else {
                break;
            };
            if let Some(node) = state.nodes.get(id) {
                results.push(SearchHit {
                    node: node.clone(),
                    score: score.0,
                });
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(material_id: &str, n: u32) -> Vec<Node> {
        (0..n)
            .map(|i| Node::new("c1", material_id, i, format!("chunk {} of {}", i, material_id)))
            .collect()
    }

    #[tokio::test]
    async fn test_memory_batch_assigns_ids() {
        let storage = InMemoryStorageAdapter::new();

        let result = storage.store_batch_nodes(chunks("m1", 3)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.count, 3);
        assert!(result.nodes.iter().all(|n| !n.id.is_empty()));
        assert_eq!(result.nodes[2].chunk_index, 2);

        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.material_count, 1);
        assert_eq!(stats.backend, AdapterKind::Memory);
    }

    #[tokio::test]
    async fn test_memory_batch_is_atomic() {
        let storage = InMemoryStorageAdapter::new();
        let mut nodes = chunks("m1", 3);
        nodes[1].content = String::new();

        let result = storage.store_batch_nodes(nodes).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_index, Some(1));
        assert_eq!(result.count, 0);
        assert_eq!(storage.get_stats().await.unwrap().node_count, 0);
    }

    #[tokio::test]
    async fn test_memory_relationship_requires_endpoints() {
        let storage = InMemoryStorageAdapter::new();
        let nodes = storage.store_batch_nodes(chunks("m1", 2)).await.unwrap().nodes;

        let ok = storage
            .store_relationship(Relationship::new(&nodes[0].id, &nodes[1].id, "follows", 1.0))
            .await
            .unwrap();
        assert!(ok.success);
        assert!(!ok.relationship.unwrap().id.is_empty());

        let missing = storage
            .store_relationship(Relationship::new(&nodes[0].id, "nope", "follows", 1.0))
            .await
            .unwrap();
        assert!(!missing.success);
        assert!(missing.error.unwrap().contains("nope"));

        assert_eq!(storage.get_stats().await.unwrap().relationship_count, 1);
    }

    #[tokio::test]
    async fn test_memory_nodes_ordered_with_edges() {
        let storage = InMemoryStorageAdapter::new();
        let mut nodes = chunks("m1", 3);
        nodes.reverse();
        let stored = storage.store_batch_nodes(nodes).await.unwrap().nodes;

        // stored is in input order: chunk 2, 1, 0
        storage
            .store_relationship(Relationship::new(&stored[2].id, &stored[0].id, "supports", 0.7))
            .await
            .unwrap();

        let result = storage.get_nodes_by_material("m1").await.unwrap();
        assert!(result.success);
        let indices: Vec<u32> = result.nodes.iter().map(|n| n.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        let edges = &result.nodes[0].source_relationships;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_chunk_index, 2);
        assert_eq!(edges[0].relationship_type, "supports");
        assert_eq!(edges[0].weight, 0.7);
    }

    #[tokio::test]
    async fn test_memory_unknown_material_is_empty() {
        let storage = InMemoryStorageAdapter::new();
        let result = storage.get_nodes_by_material("ghost").await.unwrap();
        assert!(result.success);
        assert!(result.nodes.is_empty());

        let deleted = storage.delete_material_graph("ghost").await.unwrap();
        assert!(deleted.success);
        assert_eq!(deleted.deleted_count, 0);
        assert_eq!(storage.count_nodes_by_material("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_delete_material_cascades() {
        let storage = InMemoryStorageAdapter::new();
        let a = storage.store_batch_nodes(chunks("a", 2)).await.unwrap().nodes;
        let b = storage.store_batch_nodes(chunks("b", 2)).await.unwrap().nodes;

        storage
            .store_relationship(Relationship::new(&a[0].id, &a[1].id, "next", 1.0))
            .await
            .unwrap();
        storage
            .store_relationship(Relationship::new(&b[0].id, &a[0].id, "cites", 0.5))
            .await
            .unwrap();
        storage
            .store_relationship(Relationship::new(&b[0].id, &b[1].id, "next", 1.0))
            .await
            .unwrap();

        let deleted = storage.delete_material_graph("a").await.unwrap();
        assert_eq!(deleted.deleted_count, 2);
        assert_eq!(deleted.deleted_relationships, 2);

        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.relationship_count, 1);
        assert_eq!(storage.material_ids(), vec!["b".to_string()]);

        let remaining = storage.get_nodes_by_material("b").await.unwrap().nodes;
        assert_eq!(remaining[0].source_relationships.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_snapshot_roundtrip() {
        let storage = InMemoryStorageAdapter::new();
        let nodes = storage.store_batch_nodes(chunks("m1", 2)).await.unwrap().nodes;
        storage
            .store_relationship(Relationship::new(&nodes[0].id, &nodes[1].id, "next", 1.0))
            .await
            .unwrap();

        let (nodes, relationships) = storage.snapshot();
        let restored = InMemoryStorageAdapter::from_parts(nodes.clone(), relationships).unwrap();

        assert_eq!(
            restored.get_stats().await.unwrap(),
            storage.get_stats().await.unwrap()
        );
        let again = restored.get_nodes_by_material("m1").await.unwrap().nodes;
        assert_eq!(again[0].id, nodes[0].id);
    }

    #[test]
    fn test_memory_from_parts_rejects_dangling_relationship() {
        let mut node = Node::new("c1", "m1", 0, "text");
        node.id = "n1".to_string();
        let mut rel = Relationship::new("n1", "n2", "next", 1.0);
        rel.id = "r1".to_string();

        let result = InMemoryStorageAdapter::from_parts(vec![node], vec![rel]);
        assert!(matches!(result, Err(A3SError::Backup(_))));
    }

    #[tokio::test]
    async fn test_memory_search_ranks_embedded_nodes() {
        let storage = InMemoryStorageAdapter::new();
        let mut nodes = chunks("m1", 3);
        nodes[0].embedding = Some(vec![1.0, 0.0]);
        nodes[1].embedding = Some(vec![0.0, 1.0]);
        storage.store_batch_nodes(nodes).await.unwrap();

        assert_eq!(storage.get_stats().await.unwrap().embedded_node_count, 2);

        let hits = storage.search(&[0.9, 0.1], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.chunk_index, 0);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_memory_search_skips_other_dimensions() {
        let storage = InMemoryStorageAdapter::new();
        let mut nodes = chunks("m1", 2);
        nodes[0].embedding = Some(vec![1.0, 0.0]);
        nodes[1].embedding = Some(vec![1.0, 0.0, 0.0]);
        storage.store_batch_nodes(nodes).await.unwrap();
        assert_eq!(storage.count_nodes_by_material("m1").await.unwrap(), 2);

        let hits = storage.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.chunk_index, 0);

        assert!(storage.search(&[], 5).await.unwrap().is_empty());
        assert!(storage.search(&[1.0, 0.0], 0).await.unwrap().is_empty());
    }
}
