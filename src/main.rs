use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use playclip::clock::parse_clock;
use playclip::index::load_samples;
use playclip::plays::load_plays_csv;
use playclip::{
    ClipRequestOptions, ClipSearchPipeline, ColumnRegistry, Config, IndexBuilder, IndexStore,
    Resolver, StructuredQuery, VideoIdentity, VideoTimeIndex,
};

#[derive(Parser)]
#[command(name = "playclip")]
#[command(version, about = "Find plays with structured queries and cut them out of the game video")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Which video an index belongs to.
#[derive(Args)]
struct VideoArgs {
    /// Video file, fingerprinted from its contents
    #[arg(long, conflicts_with = "video_id")]
    video: Option<PathBuf>,

    /// Video name when the file itself is not at hand
    #[arg(long)]
    video_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or reuse) the time index from calibration samples
    BuildIndex {
        #[command(flatten)]
        video: VideoArgs,
        /// JSON array of calibration samples
        #[arg(long)]
        samples: PathBuf,
        /// Video length in seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Rebuild even when a valid cached index exists
        #[arg(long)]
        force: bool,
    },
    /// Run a structured query and print clip timestamps
    Search {
        #[command(flatten)]
        video: VideoArgs,
        /// Query JSON file, or '-' for stdin
        #[arg(long)]
        query: PathBuf,
        /// Play-by-play CSV (defaults to data.plays_csv)
        #[arg(long)]
        plays: Option<PathBuf>,
        /// Override the post-play buffer in seconds
        #[arg(long)]
        post_buffer: Option<f64>,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve one quarter and game clock to a video offset
    Resolve {
        #[command(flatten)]
        video: VideoArgs,
        #[arg(long)]
        quarter: u8,
        /// Game clock as MM:SS
        #[arg(long)]
        clock: String,
    },
    /// Show column categories, or the columns of the given categories
    Columns {
        categories: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    // Initialize logging
    let level = if cli.verbose { "debug" } else { config.output.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("playclip={},warn", level))),
        )
        .with_writer(std::io::stderr)
        .init();

    config.validate()?;
    if cli.verbose {
        info!("{}", config.summary());
    }

    match cli.command {
        Commands::BuildIndex {
            video,
            samples,
            duration,
            force,
        } => build_index(&config, &video, &samples, duration, force).await,
        Commands::Search {
            video,
            query,
            plays,
            post_buffer,
            output,
        } => search(&config, &video, &query, plays, post_buffer, output).await,
        Commands::Resolve { video, quarter, clock } => resolve(&config, &video, quarter, &clock).await,
        Commands::Columns { categories } => {
            let registry = ColumnRegistry::standard();
            if categories.is_empty() {
                println!("{}", registry.category_summary());
            } else {
                for column in registry.columns_for_categories(&categories) {
                    println!("{}", column);
                }
            }
            Ok(())
        }
    }
}

async fn video_identity(args: &VideoArgs) -> Result<VideoIdentity> {
    match (&args.video, &args.video_id) {
        (Some(path), _) => VideoIdentity::from_file(path).await,
        (None, Some(id)) => Ok(VideoIdentity::named(id)),
        (None, None) => Err(anyhow!("either --video or --video-id is required")),
    }
}

async fn cached_index(config: &Config, args: &VideoArgs) -> Result<VideoTimeIndex> {
    let video = video_identity(args).await?;
    let store = IndexStore::new(config.index.cache_dir.clone());
    match store.load(&video).await {
        Ok(Some(index)) => Ok(index),
        Ok(None) => Err(anyhow!(
            "no cached index for '{}', run build-index first",
            video.video_id
        )),
        Err(e) => Err(anyhow!(
            "cached index for '{}' is unusable ({}), run build-index again",
            video.video_id,
            e
        )),
    }
}

fn to_json<T: Serialize>(config: &Config, value: &T) -> Result<String> {
    let text = if config.output.pretty_json {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

async fn build_index(
    config: &Config,
    args: &VideoArgs,
    samples_path: &Path,
    duration: Option<f64>,
    force: bool,
) -> Result<()> {
    let video = video_identity(args).await?;
    let samples = load_samples(samples_path).await?;
    let store = IndexStore::new(config.index.cache_dir.clone());
    store.initialize().await?;

    if force && store.invalidate(&video).await? {
        info!("♻️ Discarded cached index for {}", video.video_id);
    }

    let builder = IndexBuilder::new(config.index.clone());
    let (index, report) = store
        .load_or_build(&video, || builder.build(video.clone(), duration, &samples))
        .await?;

    match report {
        Some(report) => {
            for error in &report.errors {
                warn!("⚠️ {}", error);
            }
            println!("{}", to_json(config, &report)?);
        }
        None => info!("📚 Reused cached index (use --force to rebuild)"),
    }
    info!("🎉 {}", index.summary());
    Ok(())
}

async fn search(
    config: &Config,
    args: &VideoArgs,
    query_path: &Path,
    plays: Option<PathBuf>,
    post_buffer: Option<f64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let query_text = if query_path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        text
    } else {
        tokio::fs::read_to_string(query_path)
            .await
            .with_context(|| format!("Failed to read query {}", query_path.display()))?
    };
    let query = StructuredQuery::from_json(&query_text)?;

    let plays_path = plays
        .or_else(|| config.data.plays_csv.clone())
        .ok_or_else(|| anyhow!("no play-by-play CSV given (--plays or data.plays_csv)"))?;
    let table = load_plays_csv(&plays_path).await?;
    let index = cached_index(config, args).await?;

    let options = ClipRequestOptions {
        post_play_buffer_seconds: post_buffer,
    };
    let result = ClipSearchPipeline::new(config).search(&table, &index, &query, &options)?;
    let json = to_json(config, &result)?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            info!("💾 Wrote {} clips to {}", result.clips.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn resolve(config: &Config, args: &VideoArgs, quarter: u8, clock: &str) -> Result<()> {
    let clock_seconds = parse_clock(clock).ok_or_else(|| anyhow!("invalid game clock '{}', expected MM:SS", clock))?;
    let index = cached_index(config, args).await?;
    let resolution = Resolver::new(config.resolver.clone()).resolve(&index, quarter, clock_seconds as f64)?;
    println!("{}", to_json(config, &resolution)?);
    Ok(())
}
