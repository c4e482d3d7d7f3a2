//! # A3S Graph
//!
//! Knowledge-graph storage for ingested course material. Chunks of a
//! document are stored as nodes, connected by typed and weighted
//! relationships, and optionally embedded for similarity search.
//!
//! ## Core Concepts
//!
//! - **Node**: one chunk of a material, addressed within it by `chunk_index`
//! - **Relationship**: a directed, typed edge between two stored nodes
//! - **Backend**: an in-memory store, or a durable SQLite store with
//!   vector search through the sqlite-vec extension
//! - **Migration**: a backed-up, verified transfer from memory into the
//!   durable store
//!
//! ## Example
//!
//! ```rust,no_run
//! use a3s_graph::{Config, MigrationOptions, MigrationService, Node, StorageAdapterFactory};
//! use a3s_graph::storage::{store_material_graph, InMemoryStorageAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!
//!     // Collect chunks while the durable store is unavailable
//!     let scratch = InMemoryStorageAdapter::new();
//!     let nodes = vec![
//!         Node::new("bio-101", "cells", 0, "Cells are the unit of life.")
//!             .relate_to(1, "supports", 0.8),
//!         Node::new("bio-101", "cells", 1, "Every organism is made of cells."),
//!     ];
//!     store_material_graph(&scratch, nodes).await?;
//!
//!     // Move everything into the database
//!     let target = StorageAdapterFactory::new(&config).create_database_adapter().await?;
//!     let service = MigrationService::new(std::sync::Arc::new(target), config.migration.clone());
//!     let result = service.migrate(&scratch, MigrationOptions::default()).await?;
//!     println!("{}", result.to_markdown());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod migration;
pub mod storage;

pub use crate::config::Config;
pub use crate::core::{Metadata, Node, Relationship, SourceRelationship};
pub use crate::error::{A3SError, Result};
pub use crate::migration::{MigrationOptions, MigrationResult, MigrationService};
pub use crate::storage::{AdapterKind, StorageAdapter, StorageAdapterFactory};
