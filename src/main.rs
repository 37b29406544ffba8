use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use pagefeed::config::Config;
use pagefeed::engine::{RefreshEngine, RunOutcome};
use pagefeed::feed::HttpFetcher;
use pagefeed::store::JsonStore;

/// Get the config directory path (~/.config/pagefeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("pagefeed"))
}

#[derive(Parser, Debug)]
#[command(
    name = "pagefeed",
    about = "Polls Atom/RSS feeds into an outline-style document"
)]
struct Args {
    /// Path to the JSON document store
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Page holding the Feeds and Items containers
    #[arg(long)]
    page: Option<String>,

    /// Refresh interval in milliseconds (0 runs once and exits)
    #[arg(long, value_name = "MS")]
    interval: Option<u64>,

    /// Refresh every feed immediately, ignoring schedules
    #[arg(long)]
    force: bool,

    /// Create a starter store file with empty Feeds/Items containers
    #[arg(long)]
    init: bool,

    /// Config file path (default: ~/.config/pagefeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let page = args.page.unwrap_or_else(|| config.page.clone());
    let interval_ms = args.interval.unwrap_or(config.refresh_interval_ms);
    let store_path = args
        .store
        .or_else(|| config.store_path.clone())
        .unwrap_or_else(|| config_dir.join("pages.json"));

    if args.init {
        JsonStore::init(&store_path, &page)
            .with_context(|| format!("Failed to initialize store at {}", store_path.display()))?;
        println!("Created store: {}", store_path.display());
        println!("Add feed-definition blocks under the Feeds container, then rerun.");
        return Ok(());
    }

    if !store_path.exists() {
        eprintln!("Error: no store file found at {}", store_path.display());
        eprintln!();
        eprintln!("To get started, create one:");
        eprintln!("  pagefeed --init --store {}", store_path.display());
        std::process::exit(1);
    }

    let store = JsonStore::open(&store_path)
        .with_context(|| format!("Failed to open store at {}", store_path.display()))?;
    let engine = RefreshEngine::new(store, HttpFetcher::new(), page);

    if interval_ms == 0 {
        // One-shot: surface the run's failure through the exit code.
        match engine.refresh(args.force).await? {
            RunOutcome::Completed(summary) => {
                println!(
                    "Refreshed {} feed(s); {} item(s){}",
                    summary.feeds_due,
                    summary.item_count,
                    if summary.items_changed {
                        " (updated)"
                    } else {
                        " (unchanged)"
                    }
                );
            }
            RunOutcome::SkippedBusy => unreachable!("no concurrent run in one-shot mode"),
        }
        return Ok(());
    }

    tracing::info!(interval_ms, "Starting periodic refresh");
    tokio::select! {
        _ = engine.run_periodic(Duration::from_millis(interval_ms), args.force) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping.");
        }
    }

    Ok(())
}
