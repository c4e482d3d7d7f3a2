use a3s_graph::migration::BackupSnapshot;
use a3s_graph::{Config, MigrationOptions, MigrationService, StorageAdapter, StorageAdapterFactory};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "a3s-graph")]
#[command(about = "A3S Graph - knowledge-graph storage and migration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (overrides the configuration)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which backend is available and its statistics
    Status,

    /// Show storage statistics as JSON
    Stats,

    /// Restore a backup into memory and migrate it into the database
    Migrate {
        /// Backup file to migrate from
        #[arg(long)]
        from_backup: PathBuf,

        /// Write the backup and report source statistics only
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete materials from the database
    Rollback {
        /// Material ids to delete
        #[arg(required = true)]
        material_ids: Vec<String>,
    },

    /// Summarise a backup file
    InspectBackup {
        /// Backup file
        file: PathBuf,
    },

    /// Embed nodes stored without a vector
    Backfill {
        /// Maximum number of nodes to process
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .init();

    let factory = StorageAdapterFactory::new(&config);

    match cli.command {
        Commands::Status => {
            let kind = factory.adapter_type().await;
            println!("Adapter: {}", kind);
            println!(
                "Database: {}",
                config.storage.database.path.display()
            );

            let stats = factory.create_adapter().await.get_stats().await?;
            println!("Nodes: {}", stats.node_count);
            println!("  embedded: {}", stats.embedded_node_count);
            println!("Relationships: {}", stats.relationship_count);
            println!("Materials: {}", stats.material_count);
        }

        Commands::Stats => {
            let stats = factory.create_adapter().await.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Migrate {
            from_backup,
            dry_run,
        } => {
            let source = MigrationService::restore(&from_backup).await?;
            let target = factory.create_database_adapter().await?;
            let service = MigrationService::new(Arc::new(target), config.migration.clone());

            let result = service.migrate(&source, MigrationOptions { dry_run }).await?;
            println!("{}", result.to_markdown());

            if !result.success {
                anyhow::bail!("{} material(s) failed to migrate", result.errors.len());
            }
        }

        Commands::Rollback { material_ids } => {
            let target = factory.create_database_adapter().await?;
            let service = MigrationService::new(Arc::new(target), config.migration.clone());

            let result = service.rollback(&material_ids).await;
            for (material_id, count) in &result.deleted {
                println!("✓ {}: {} nodes deleted", material_id, count);
            }
            for err in &result.errors {
                println!("✗ {}: {}", err.material_id, err.error);
            }
            println!("\nTotal deleted: {}", result.total_deleted);

            if !result.success {
                anyhow::bail!("rollback failed for {} material(s)", result.errors.len());
            }
        }

        Commands::InspectBackup { file } => {
            let snapshot = BackupSnapshot::read(&file).await?;
            println!("Backup: {}", file.display());
            println!("Taken: {}", snapshot.timestamp.to_rfc3339());
            println!(
                "Nodes: {}, Relationships: {}",
                snapshot.nodes.len(),
                snapshot.relationships.len()
            );

            let mut per_material: BTreeMap<&str, usize> = BTreeMap::new();
            for node in &snapshot.nodes {
                *per_material.entry(node.material_id.as_str()).or_default() += 1;
            }
            println!("\nMaterials:");
            for (material_id, count) in per_material {
                println!("  {} ({} nodes)", material_id, count);
            }
        }

        Commands::Backfill { limit } => {
            let db = factory.create_database_adapter().await?;
            let pending = db.count_missing_embeddings()?;
            println!("Nodes without embedding: {}", pending);

            let result = db.backfill_embeddings(limit).await?;
            println!(
                "✓ Embedded: {}, Failed: {}, Attempted: {}",
                result.embedded, result.failed, result.attempted
            );
        }
    }

    Ok(())
}
