//! Durable SQLite storage with sqlite-vec similarity search
//!
//! Nodes are embedded through the injected [`EmbeddingProvider`] before they
//! are written. A failed embedding does not fail the write: the node is
//! stored with a NULL vector, reported in the result's warnings, and picked
//! up later by [`DatabaseStorageAdapter::backfill_embeddings`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::{Metadata, Node, Relationship, SourceRelationship};
use crate::embedding::{EmbeddingProvider, EmbeddingResult};
use crate::error::Result;

use super::schema::run_migrations;
use super::vector::{decode_vector, encode_vector, register_vector_extension};
use super::{
    AdapterKind, BatchStoreResult, DeleteResult, GraphStats, NodesResult, SearchHit,
    StorageAdapter, StoreRelationshipResult,
};

const NODE_COLUMNS: &str =
    "id, course_id, material_id, content, chunk_index, embedding, metadata, created_at";

const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of an embedding backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillResult {
    pub attempted: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Vector-indexed graph store backed by SQLite
pub struct DatabaseStorageAdapter {
    conn: Mutex<Connection>,
    provider: Arc<dyn EmbeddingProvider>,
    concurrency: usize,
}

impl DatabaseStorageAdapter {
    /// Open (or create) the database described by `config`
    pub fn open(config: &DatabaseConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if config.load_vector_extension {
            register_vector_extension();
        }

        let conn = if config.path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(&config.path)?
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        Self::from_connection(conn, provider)
    }

    /// Process-local database, mostly useful for tests
    pub fn open_in_memory(provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        register_vector_extension();
        Self::from_connection(Connection::open_in_memory()?, provider)
    }

    /// Wrap an existing connection, applying pragmas and schema migrations
    pub fn from_connection(conn: Connection, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if conn.path().is_some_and(|p| !p.is_empty()) {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            provider,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Number of chunks embedded concurrently during a batch write
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Number of nodes stored without a vector
    pub fn count_missing_embeddings(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE embedding IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Re-run the embedding provider over up to `limit` nodes that were
    /// stored without a vector.
    pub async fn backfill_embeddings(&self, limit: usize) -> Result<BackfillResult> {
        let pending = self.nodes_missing_embeddings(limit)?;
        if pending.is_empty() {
            return Ok(BackfillResult::default());
        }

        let texts: Vec<String> = pending.iter().map(|(_, content)| content.clone()).collect();
        let outcomes: Vec<EmbeddingResult> = stream::iter(texts)
            .map(|text| {
                let provider = Arc::clone(&self.provider);
                async move { provider.generate_embedding(&text).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut result = BackfillResult {
            attempted: pending.len(),
            ..Default::default()
        };
        let updates: Vec<(String, Vec<f32>)> = pending
            .into_iter()
            .zip(outcomes)
            .filter_map(|((id, _), outcome)| match outcome.vector {
                Some(vector) if outcome.success => Some((id, vector)),
                _ => {
                    tracing::debug!(node_id = %id, error = ?outcome.error, "Backfill embedding failed");
                    None
                }
            })
            .collect();

        result.embedded = self.write_embeddings(&updates)?;
        result.failed = result.attempted - result.embedded;

        tracing::info!(
            attempted = result.attempted,
            embedded = result.embedded,
            failed = result.failed,
            "Embedding backfill finished"
        );
        Ok(result)
    }

    fn nodes_missing_embeddings(&self, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content FROM nodes WHERE embedding IS NULL
             ORDER BY material_id, chunk_index LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn write_embeddings(&self, updates: &[(String, Vec<f32>)]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut written = 0;
        for (id, vector) in updates {
            written += tx.execute(
                "UPDATE nodes SET embedding = ?2 WHERE id = ?1",
                params![id, encode_vector(vector)],
            )?;
        }
        tx.commit()?;
        Ok(written)
    }

    fn write_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO nodes (id, course_id, material_id, content, chunk_index, embedding, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for node in nodes {
                stmt.execute(params![
                    node.id,
                    node.course_id,
                    node.material_id,
                    node.content,
                    node.chunk_index as i64,
                    node.embedding.as_deref().map(encode_vector),
                    serde_json::to_string(&node.metadata)?,
                    node.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn node_exists(conn: &Connection, id: &str) -> Result<bool> {
        let found = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_relationship(&self, relationship: &Relationship) -> Result<Option<String>> {
        let conn = self.conn.lock();
        for endpoint in [&relationship.source_node_id, &relationship.target_node_id] {
            if !Self::node_exists(&conn, endpoint)? {
                return Ok(Some(format!("unknown node id {}", endpoint)));
            }
        }

        conn.execute(
            "INSERT INTO relationships (id, source_node_id, target_node_id, relationship_type, weight, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                relationship.id,
                relationship.source_node_id,
                relationship.target_node_id,
                relationship.relationship_type,
                relationship.weight,
                serde_json::to_string(&relationship.metadata)?,
                relationship.created_at.to_rfc3339(),
            ],
        )?;
        Ok(None)
    }

    fn load_material(&self, material_id: &str) -> Result<Vec<Node>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE material_id = ?1 ORDER BY chunk_index, rowid"
        ))?;
        let raw_nodes = stmt
            .query_map([material_id], RawNodeRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT r.source_node_id, t.chunk_index, r.relationship_type, r.weight, r.metadata
             FROM relationships r
             JOIN nodes s ON r.source_node_id = s.id
             JOIN nodes t ON r.target_node_id = t.id
             WHERE s.material_id = ?1 AND t.material_id = ?1
             ORDER BY r.created_at, r.rowid",
        )?;
        let raw_edges = stmt
            .query_map([material_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut edges: HashMap<String, Vec<SourceRelationship>> = HashMap::new();
        for (source_id, target_chunk, relationship_type, weight, metadata) in raw_edges {
            edges.entry(source_id).or_default().push(SourceRelationship {
                target_chunk_index: target_chunk as u32,
                relationship_type,
                weight,
                metadata: parse_metadata(&metadata),
            });
        }

        Ok(raw_nodes
            .into_iter()
            .map(|raw| {
                let mut node = raw.into_node();
                node.source_relationships = edges.remove(&node.id).unwrap_or_default();
                node
            })
            .collect())
    }

    fn delete_material(&self, material_id: &str) -> Result<DeleteResult> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted_relationships = tx.execute(
            "DELETE FROM relationships
             WHERE source_node_id IN (SELECT id FROM nodes WHERE material_id = ?1)
                OR target_node_id IN (SELECT id FROM nodes WHERE material_id = ?1)",
            [material_id],
        )?;
        let deleted_count = tx.execute("DELETE FROM nodes WHERE material_id = ?1", [material_id])?;
        tx.commit()?;

        Ok(DeleteResult {
            success: true,
            deleted_count,
            deleted_relationships,
        })
    }

    fn query_stats(&self) -> Result<GraphStats> {
        let conn = self.conn.lock();
        let stats = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM nodes),
                (SELECT COUNT(*) FROM relationships),
                (SELECT COUNT(DISTINCT material_id) FROM nodes),
                (SELECT COUNT(*) FROM nodes WHERE embedding IS NOT NULL)",
            [],
            |row| {
                Ok(GraphStats {
                    backend: AdapterKind::Database,
                    node_count: row.get::<_, i64>(0)? as usize,
                    relationship_count: row.get::<_, i64>(1)? as usize,
                    material_count: row.get::<_, i64>(2)? as usize,
                    embedded_node_count: row.get::<_, i64>(3)? as usize,
                })
            },
        )?;
        Ok(stats)
    }

    fn query_similar(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS}, vec_distance_cosine(embedding, ?1) AS distance
             FROM nodes
             WHERE embedding IS NOT NULL AND length(embedding) = ?2
             ORDER BY distance ASC
             LIMIT ?3"
        ))?;

        let rows = stmt
            .query_map(
                params![
                    encode_vector(query_embedding),
                    (query_embedding.len() * 4) as i64,
                    k as i64
                ],
                |row| Ok((RawNodeRow::from_row(row)?, row.get::<_, f64>(8)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .map(|(raw, distance)| SearchHit {
                node: raw.into_node(),
                score: (1.0 - distance) as f32,
            })
            .collect())
    }
}

/// Raw row from the nodes table.
struct RawNodeRow {
    id: String,
    course_id: String,
    material_id: String,
    content: String,
    chunk_index: i64,
    embedding: Option<Vec<u8>>,
    metadata: String,
    created_at: String,
}

impl RawNodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            course_id: row.get(1)?,
            material_id: row.get(2)?,
            content: row.get(3)?,
            chunk_index: row.get(4)?,
            embedding: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_node(self) -> Node {
        let embedding = self.embedding.as_deref().and_then(|blob| {
            let decoded = decode_vector(blob);
            if decoded.is_none() {
                tracing::warn!(node_id = %self.id, "Discarding malformed embedding blob");
            }
            decoded
        });

        Node {
            id: self.id,
            course_id: self.course_id,
            material_id: self.material_id,
            content: self.content,
            chunk_index: self.chunk_index as u32,
            embedding,
            metadata: parse_metadata(&self.metadata),
            source_relationships: Vec::new(),
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl StorageAdapter for DatabaseStorageAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Database
    }

    async fn store_batch_nodes(&self, nodes: Vec<Node>) -> Result<BatchStoreResult> {
        if let Some((index, reason)) = nodes
            .iter()
            .enumerate()
            .find_map(|(i, n)| n.validation_error().map(|e| (i, e)))
        {
            return Ok(BatchStoreResult::rejected(index, reason));
        }

        // Nodes that already carry a vector are not re-embedded.
        let texts: Vec<Option<String>> = nodes
            .iter()
            .map(|n| (!n.is_embedded()).then(|| n.content.clone()))
            .collect();

        // Embed concurrently; `buffered` yields in input order.
        let outcomes: Vec<Option<EmbeddingResult>> = stream::iter(texts)
            .map(|text| {
                let provider = Arc::clone(&self.provider);
                async move {
                    match text {
                        Some(text) => Some(provider.generate_embedding(&text).await),
                        None => None,
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut warnings = Vec::new();
        let mut stored = Vec::with_capacity(nodes.len());
        for (mut node, outcome) in nodes.into_iter().zip(outcomes) {
            node.id = Uuid::new_v4().to_string();
            node.source_relationships.clear();

            if let Some(outcome) = outcome {
                match outcome.vector {
                    Some(vector) if outcome.success => node.embedding = Some(vector),
                    _ => {
                        let reason = outcome.error.unwrap_or_else(|| "no vector".to_string());
                        tracing::warn!(
                            material_id = %node.material_id,
                            chunk_index = node.chunk_index,
                            error = %reason,
                            "Storing node without embedding"
                        );
                        warnings.push(format!(
                            "chunk {} of {} stored without embedding: {}",
                            node.chunk_index, node.material_id, reason
                        ));
                        node.embedding = None;
                    }
                }
            }
            stored.push(node);
        }

        self.write_nodes(&stored)?;

        Ok(BatchStoreResult {
            success: true,
            count: stored.len(),
            nodes: stored,
            error: None,
            failed_index: None,
            warnings,
        })
    }

    async fn store_relationship(
        &self,
        mut relationship: Relationship,
    ) -> Result<StoreRelationshipResult> {
        if let Some(reason) = relationship.validation_error() {
            return Ok(StoreRelationshipResult::rejected(reason));
        }

        relationship.id = Uuid::new_v4().to_string();
        if let Some(reason) = self.insert_relationship(&relationship)? {
            return Ok(StoreRelationshipResult::rejected(reason));
        }

        Ok(StoreRelationshipResult {
            success: true,
            relationship: Some(relationship),
            error: None,
        })
    }

    async fn get_nodes_by_material(&self, material_id: &str) -> Result<NodesResult> {
        Ok(NodesResult {
            success: true,
            nodes: self.load_material(material_id)?,
            error: None,
        })
    }

    async fn count_nodes_by_material(&self, material_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE material_id = ?1",
            [material_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn delete_material_graph(&self, material_id: &str) -> Result<DeleteResult> {
        let result = self.delete_material(material_id)?;
        tracing::debug!(
            material_id,
            deleted_count = result.deleted_count,
            deleted_relationships = result.deleted_relationships,
            "Deleted material graph from database"
        );
        Ok(result)
    }

    async fn get_stats(&self) -> Result<GraphStats> {
        self.query_stats()
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.query_similar(query_embedding, k)
    }
}
