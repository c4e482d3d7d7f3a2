//! Runtime backend selection
//!
//! The factory probes for the vector extension on every call. Nothing is
//! cached, so an extension that becomes available mid-session is picked up by
//! the next adapter construction.

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;

use crate::config::{Config, DatabaseConfig};
use crate::embedding::create_embedding_provider;
use crate::error::{A3SError, Result};

use super::vector::{register_vector_extension, vector_extension_version};
use super::{AdapterKind, DatabaseStorageAdapter, InMemoryStorageAdapter, StorageAdapter};

/// Checks whether the durable store can serve vector queries
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// `Ok(false)` and `Err(_)` both mean "unavailable" to the factory
    async fn vector_extension_available(&self, config: &DatabaseConfig) -> Result<bool>;
}

/// Probe running `SELECT vec_version()` against the configured database
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteVecProbe;

#[async_trait]
impl CapabilityProbe for SqliteVecProbe {
    async fn vector_extension_available(&self, config: &DatabaseConfig) -> Result<bool> {
        if config.load_vector_extension {
            register_vector_extension();
        }

        // An existing file is probed read-only; a database that does not
        // exist yet is probed through a scratch connection.
        let conn = if config.path.exists() {
            Connection::open_with_flags(
                &config.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            Connection::open_in_memory()?
        };

        Ok(vector_extension_version(&conn).is_some())
    }
}

/// Hands out the best available storage adapter
pub struct StorageAdapterFactory {
    config: Config,
    probe: Arc<dyn CapabilityProbe>,
}

impl StorageAdapterFactory {
    pub fn new(config: &Config) -> Self {
        Self::with_probe(config, Arc::new(SqliteVecProbe))
    }

    pub fn with_probe(config: &Config, probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            config: config.clone(),
            probe,
        }
    }

    /// Return a database adapter when the vector store is requested and
    /// available, otherwise an in-memory adapter. Never fails.
    pub async fn create_adapter(&self) -> Arc<dyn StorageAdapter> {
        if !self.config.storage.use_vector_store {
            tracing::info!("Vector store disabled by configuration, using in-memory storage");
            return Arc::new(InMemoryStorageAdapter::new());
        }

        match self.create_database_adapter().await {
            Ok(adapter) => {
                tracing::info!(
                    path = %self.config.storage.database.path.display(),
                    "Using database storage with vector search"
                );
                Arc::new(adapter)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Database storage unavailable, falling back to in-memory storage");
                Arc::new(InMemoryStorageAdapter::new())
            }
        }
    }

    /// Construct a database adapter, failing if the vector store is disabled
    /// or unavailable. Used when a durable target is mandatory.
    pub async fn create_database_adapter(&self) -> Result<DatabaseStorageAdapter> {
        if !self.config.storage.use_vector_store {
            return Err(A3SError::CapabilityUnavailable(
                "vector store disabled by configuration".to_string(),
            ));
        }
        if !self.probe_vector_store().await {
            return Err(A3SError::CapabilityUnavailable(
                "sqlite-vec extension not available".to_string(),
            ));
        }

        let provider = create_embedding_provider(&self.config.embedding)?;
        let adapter = DatabaseStorageAdapter::open(&self.config.storage.database, provider)?
            .with_concurrency(self.config.embedding.concurrency);
        Ok(adapter)
    }

    /// Which adapter `create_adapter` would hand out right now, without
    /// constructing one
    pub async fn adapter_type(&self) -> AdapterKind {
        if self.config.storage.use_vector_store && self.probe_vector_store().await {
            AdapterKind::Database
        } else {
            AdapterKind::Memory
        }
    }

    async fn probe_vector_store(&self) -> bool {
        match self
            .probe
            .vector_extension_available(&self.config.storage.database)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Vector extension not installed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Vector extension probe failed");
                false
            }
        }
    }
}
