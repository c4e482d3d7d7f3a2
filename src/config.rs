//! Configuration for A3S Graph

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for A3S Graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Migration configuration
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            migration: MigrationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Config = if path.ends_with(".yaml") || path.ends_with(".yml") {
            serde_yaml::from_str(&content)
                .map_err(|e| crate::A3SError::Config(e.to_string()))?
        } else if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| crate::A3SError::Config(e.to_string()))?
        } else {
            serde_json::from_str(&content)?
        };

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Storage
        if let Ok(flag) = std::env::var("A3S_USE_VECTOR_STORE") {
            config.storage.use_vector_store = parse_flag(&flag);
        }
        if let Ok(path) = std::env::var("A3S_DATABASE_PATH") {
            config.storage.database.path = PathBuf::from(path);
        }

        // Embedding
        if let Ok(provider) = std::env::var("A3S_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(api_base) = std::env::var("A3S_EMBEDDING_API_BASE") {
            config.embedding.api_base = Some(api_base);
        }
        if let Ok(api_key) = std::env::var("A3S_EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("A3S_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        // Migration
        if let Ok(dir) = std::env::var("A3S_BACKUP_DIR") {
            config.migration.backup_dir = PathBuf::from(dir);
        }

        // Log level
        if let Ok(level) = std::env::var("A3S_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(mut self, other: Config) -> Self {
        if other.storage.database.path != default_database_path()
            || !other.storage.use_vector_store
        {
            self.storage = other.storage;
        }
        if other.embedding.api_base.is_some()
            || other.embedding.provider != default_embedding_provider()
        {
            self.embedding = other.embedding;
        }
        if other.migration.backup_dir != default_backup_dir() {
            self.migration = other.migration;
        }
        if other.log_level != "info" {
            self.log_level = other.log_level;
        }
        self
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Request the vector-indexed database backend. `false` always selects
    /// the in-memory backend without probing.
    #[serde(default = "default_use_vector_store")]
    pub use_vector_store: bool,

    /// Durable database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            use_vector_store: default_use_vector_store(),
            database: DatabaseConfig::default(),
        }
    }
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (`:memory:` for a process-local database)
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Register the bundled sqlite-vec extension before connecting
    #[serde(default = "default_load_vector_extension")]
    pub load_vector_extension: bool,

    /// Busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            load_vector_extension: default_load_vector_extension(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type (`openai`, `ollama`/`local`, `mock`)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API base URL
    pub api_base: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Number of chunks embedded concurrently during a batch write
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum number of cached vectors (0 disables the cache)
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_base: None,
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            concurrency: default_concurrency(),
            cache_size: default_cache_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory receiving one backup snapshot per migration attempt
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_use_vector_store() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./a3s_data/graph.db")
}

fn default_load_vector_extension() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_concurrency() -> usize {
    4
}

fn default_cache_size() -> usize {
    10_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./a3s_data/backups")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert!(config.storage.use_vector_store);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(
            config.migration.backup_dir,
            PathBuf::from("./a3s_data/backups")
        );
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, PathBuf::from("./a3s_data/graph.db"));
        assert!(config.load_vector_extension);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_embedding_config_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.cache_size, 10_000);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nonsense"));
    }

    #[test]
    fn test_config_from_json_partial() {
        let json = r#"{ "storage": { "use_vector_store": false }, "log_level": "debug" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(!config.storage.use_vector_store);
        assert_eq!(config.storage.database.path, default_database_path());
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.toml");
        std::fs::write(
            &path,
            r#"
log_level = "warn"

[storage.database]
path = "/var/lib/a3s/graph.db"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dimension = 768
"#,
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(
            config.storage.database.path,
            PathBuf::from("/var/lib/a3s/graph.db")
        );
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.embedding.dimension, 768);
        assert!(config.storage.use_vector_store);
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("A3S_USE_VECTOR_STORE", "false");
        std::env::set_var("A3S_BACKUP_DIR", "/tmp/a3s-backups");

        let config = Config::from_env();

        assert!(!config.storage.use_vector_store);
        assert_eq!(
            config.migration.backup_dir,
            PathBuf::from("/tmp/a3s-backups")
        );

        std::env::remove_var("A3S_USE_VECTOR_STORE");
        std::env::remove_var("A3S_BACKUP_DIR");
    }

    #[test]
    fn test_config_merge() {
        let base = Config::default();

        let mut other = Config::default();
        other.log_level = "debug".to_string();
        other.storage.use_vector_store = false;
        other.embedding.provider = "mock".to_string();

        let merged = base.merge(other);
        assert_eq!(merged.log_level, "debug");
        assert!(!merged.storage.use_vector_store);
        assert_eq!(merged.embedding.provider, "mock");
        assert_eq!(merged.migration.backup_dir, default_backup_dir());
    }
}
