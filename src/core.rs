//! Core data structures for A3S Graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque key/value bag attached to nodes and relationships
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A persisted chunk of ingested material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Backend-assigned identity. Empty until stored; not stable across backends.
    #[serde(default)]
    pub id: String,

    /// Course the material belongs to
    pub course_id: String,

    /// Source material; all chunks of one document share it
    pub material_id: String,

    /// Chunk text
    pub content: String,

    /// Zero-based position within the material
    pub chunk_index: u32,

    /// Embedding vector, absent until a vector-capable backend computes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Outbound edges expressed as chunk-index references. Never persisted
    /// on the node itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_relationships: Vec<SourceRelationship>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Create an unsaved node
    pub fn new(
        course_id: impl Into<String>,
        material_id: impl Into<String>,
        chunk_index: u32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            course_id: course_id.into(),
            material_id: material_id.into(),
            content: content.into(),
            chunk_index,
            embedding: None,
            metadata: Metadata::new(),
            source_relationships: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach an outbound edge to another chunk of the same material
    pub fn relate_to(
        mut self,
        target_chunk_index: u32,
        relationship_type: impl Into<String>,
        weight: f64,
    ) -> Self {
        self.source_relationships.push(SourceRelationship {
            target_chunk_index,
            relationship_type: relationship_type.into(),
            weight,
            metadata: Metadata::new(),
        });
        self
    }

    /// Check if this node has been embedded
    pub fn is_embedded(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Copy keeping only the backend-independent fields and the chunk-index
    /// edges, ready to be written into another backend.
    pub fn detached(&self) -> Self {
        Self {
            id: String::new(),
            course_id: self.course_id.clone(),
            material_id: self.material_id.clone(),
            content: self.content.clone(),
            chunk_index: self.chunk_index,
            embedding: None,
            metadata: self.metadata.clone(),
            source_relationships: self.source_relationships.clone(),
            created_at: self.created_at,
        }
    }

    /// Reason this node cannot be stored, if any
    pub(crate) fn validation_error(&self) -> Option<String> {
        if self.material_id.trim().is_empty() {
            return Some("material_id must not be empty".to_string());
        }
        if self.content.trim().is_empty() {
            return Some(format!(
                "content must not be empty (material {}, chunk {})",
                self.material_id, self.chunk_index
            ));
        }
        None
    }
}

/// Pre-persistence edge from a node to another chunk of its material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRelationship {
    /// Chunk index of the target within the same material
    pub target_chunk_index: u32,

    /// Free-form relationship tag
    pub relationship_type: String,

    /// Strength of the edge
    pub weight: f64,

    /// Metadata
    #[serde(default)]
    pub metadata: Metadata,
}

/// Directed, weighted edge between two nodes of the same backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Backend-assigned identity
    #[serde(default)]
    pub id: String,

    /// Backend-local id of the source node
    pub source_node_id: String,

    /// Backend-local id of the target node
    pub target_node_id: String,

    /// Free-form relationship tag
    pub relationship_type: String,

    /// Strength of the edge
    pub weight: f64,

    /// Metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create an unsaved relationship between two stored nodes
    pub fn new(
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
        relationship_type: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: String::new(),
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            relationship_type: relationship_type.into(),
            weight,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn validation_error(&self) -> Option<String> {
        if self.relationship_type.trim().is_empty() {
            return Some("relationship_type must not be empty".to_string());
        }
        if !self.weight.is_finite() {
            return Some(format!("weight must be finite, got {}", self.weight));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_new() {
        let node = Node::new("c1", "m1", 0, "Photosynthesis converts light.");

        assert!(node.id.is_empty());
        assert_eq!(node.course_id, "c1");
        assert_eq!(node.material_id, "m1");
        assert_eq!(node.chunk_index, 0);
        assert!(!node.is_embedded());
        assert!(node.source_relationships.is_empty());
    }

    #[test]
    fn test_node_relate_to() {
        let node = Node::new("c1", "m1", 0, "text")
            .relate_to(2, "supports", 0.8)
            .relate_to(1, "follows", 1.0);

        assert_eq!(node.source_relationships.len(), 2);
        assert_eq!(node.source_relationships[0].target_chunk_index, 2);
        assert_eq!(node.source_relationships[0].relationship_type, "supports");
        assert_eq!(node.source_relationships[1].weight, 1.0);
    }

    #[test]
    fn test_node_detached_strips_identity() {
        let mut node = Node::new("c1", "m1", 3, "text")
            .with_metadata("source", serde_json::json!("lecture.pdf"))
            .relate_to(0, "refers", 0.5);
        node.id = "abc".to_string();
        node.embedding = Some(vec![0.1, 0.2]);

        let copy = node.detached();
        assert!(copy.id.is_empty());
        assert!(copy.embedding.is_none());
        assert_eq!(copy.chunk_index, 3);
        assert_eq!(copy.metadata["source"], "lecture.pdf");
        assert_eq!(copy.source_relationships, node.source_relationships);
    }

    #[test]
    fn test_node_validation() {
        assert!(Node::new("c1", "m1", 0, "ok").validation_error().is_none());
        assert!(Node::new("c1", "m1", 0, "   ").validation_error().is_some());
        assert!(Node::new("c1", "", 0, "text").validation_error().is_some());
    }

    #[test]
    fn test_empty_embedding_is_not_embedded() {
        let mut node = Node::new("c1", "m1", 0, "text");
        node.embedding = Some(Vec::new());
        assert!(!node.is_embedded());
    }

    #[test]
    fn test_relationship_validation() {
        let rel = Relationship::new("a", "b", "supports", 1.0);
        assert!(rel.validation_error().is_none());

        let rel = Relationship::new("a", "b", "", 1.0);
        assert!(rel.validation_error().is_some());

        let rel = Relationship::new("a", "b", "supports", f64::NAN);
        assert!(rel.validation_error().is_some());
    }

    #[test]
    fn test_node_serialization_skips_transient_fields() {
        let node = Node::new("c1", "m1", 0, "text");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("source_relationships").is_none());

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
