use anyhow::Result;
use clap::{Parser, Subcommand};
use playclip::{Config, IndexStore};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "index-cache")]
#[command(about = "Video time index cache management utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Defaults to index.cache_dir from the config
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all cached indexes
    List,
    /// Get cache statistics
    Stats,
    /// Invalidate the cached index with this key
    Invalidate {
        /// Cache key to invalidate (see `list`)
        cache_key: String,
    },
    /// Clear all cache entries
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();

    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => Config::load()?.index.cache_dir,
    };
    let store = IndexStore::new(cache_dir);
    store.initialize().await?;

    match cli.command {
        Commands::List => {
            let indexes = store.list().await?;

            if indexes.is_empty() {
                info!("📭 No cached indexes found");
                return Ok(());
            }

            info!("📚 Found {} cached indexes:", indexes.len());

            for entry in indexes {
                let status = if entry.valid { "✅ Valid" } else { "❌ Invalid" };
                info!(
                    "  {} - {} points, {} dead zones, {}",
                    entry.cache_key, entry.points, entry.dead_zones, status
                );
                if let Some(built_at) = entry.built_at {
                    info!("    Video: {} (built {})", entry.video_id, built_at.format("%Y-%m-%d %H:%M"));
                }
                if !entry.degraded_quarters.is_empty() {
                    warn!("    Degraded quarters: {:?}", entry.degraded_quarters);
                }
            }
        }

        Commands::Stats => {
            let stats = store.stats().await?;
            info!("📊 Cache Statistics:");
            info!("  Total files: {}", stats.total_files);
            info!("  Valid files: {}", stats.valid_files);
            info!("  Invalid files: {}", stats.invalid_files);
            info!("  Total calibration points: {}", stats.total_points);
        }

        Commands::Invalidate { cache_key } => {
            let removed = store.invalidate_key(&cache_key).await?;
            if removed {
                info!("✅ Successfully invalidated cache for: {}", cache_key);
            } else {
                warn!("⚠️ Cache key not found: {}", cache_key);
            }
        }

        Commands::Clear => {
            let count = store.clear().await?;
            info!("🧹 Cleared {} cache files", count);
        }
    }

    Ok(())
}
