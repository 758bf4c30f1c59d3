//! Response Cache maintenance tool
//!
//! Inspects and trims the cache file an API client writes to. The file is
//! chosen by the same environment variables the library reads.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use response_cache::{CacheItem, CacheStore, Config, MaxAge};

/// Inspect and maintain a response cache file
#[derive(Parser, Debug)]
#[command(name = "response-cache", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the entry count and file size as JSON
    Stats,
    /// List every entry with its age, oldest first
    List,
    /// Print the entry stored under a key if it is still fresh
    Get {
        key: String,
        /// Max age in seconds (defaults to RESPONSE_CACHE_MAX_AGE)
        #[arg(long, conflicts_with = "any_age")]
        max_age: Option<i64>,
        /// Ignore the entry's age
        #[arg(long)]
        any_age: bool,
    },
    /// Delete the entry stored under a key
    Remove { key: String },
    /// Delete every entry
    Flush,
    /// Delete the oldest entries until the file is roughly the target size
    Shrink {
        /// Target size in bytes (defaults to RESPONSE_CACHE_MAX_SIZE)
        #[arg(long)]
        target_bytes: Option<i64>,
    },
}

/// Figures that outlive the process. Hit and miss counters start at zero on
/// every open, so a one-shot command has nothing useful to say about them.
#[derive(Serialize)]
struct StatsReport {
    path: String,
    total_entries: u64,
    file_size_bytes: u64,
}

#[derive(Serialize)]
struct ListedItem<'a> {
    #[serde(flatten)]
    item: &'a CacheItem,
    age_seconds: i64,
}

fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "response_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    info!(
        "Configuration loaded: cache_path={}, max_size_bytes={}, default_max_age={}s",
        config.cache_path.display(),
        config.max_size_bytes,
        config.default_max_age
    );

    let store = CacheStore::from_config(&config)
        .with_context(|| format!("failed to open cache at {}", config.cache_path.display()))?;

    run(&store, &config, cli.command)?;

    store.close().context("failed to close cache")?;
    Ok(())
}

fn run(store: &CacheStore, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Stats => {
            let stats = store.stats()?;
            let report = StatsReport {
                path: store.path().display().to_string(),
                total_entries: stats.total_entries,
                file_size_bytes: stats.file_size_bytes,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::List => {
            let items = store.items()?;
            let listed: Vec<ListedItem<'_>> = items
                .iter()
                .map(|item| ListedItem {
                    item,
                    age_seconds: item.age().num_seconds(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        Command::Get {
            key,
            max_age,
            any_age,
        } => {
            let max_age = if any_age {
                MaxAge::Never
            } else {
                let secs = max_age.unwrap_or(i64::try_from(config.default_max_age)?);
                MaxAge::seconds(secs)?
            };
            print_item(store.get(&key, max_age, false)?, &key)?;
        }
        Command::Remove { key } => {
            print_item(store.remove(&key)?, &key)?;
        }
        Command::Flush => {
            let removed = store.flush()?;
            println!("Removed {} entries", removed);
        }
        Command::Shrink { target_bytes } => {
            let target = target_bytes.unwrap_or(config.max_size_bytes);
            let before = store.file_size()?;
            let removed = store.shrink(target)?;
            println!(
                "Removed {} entries ({} -> {} bytes)",
                removed,
                before,
                store.file_size()?
            );
        }
    }
    Ok(())
}

fn print_item(item: Option<CacheItem>, key: &str) -> Result<()> {
    match item {
        Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
        None => eprintln!("No fresh entry for '{}'", key),
    }
    Ok(())
}
