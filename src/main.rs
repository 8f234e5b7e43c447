//! # tb - project, board and task manager
//!
//! Command-line front end over the `taskboard` cache. Each invocation loads
//! the data file through the cache, runs one command, and writes accepted
//! mutations back to the file.
//!
//! ## Quick Start
//!
//! ```bash
//! tb project add "Website"
//! tb board add "Sprint 1" --project <project-id>
//! tb task add "Fix login" --board <board-id> --label bug,frontend --due tomorrow
//! tb tasks --board <board-id> --status "to do"
//! tb project rm <project-id>      # removes its boards and tasks too
//! ```
//!
//! Data is stored in `~/.taskboard/data.json` unless `--data` says otherwise.
//! Set `RUST_LOG=debug` to watch reconciliations and rollbacks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use taskboard::{Cache, CacheConfig, JsonFileService};

mod cli;
mod cmd;

use cli::Cli;
use cmd::*;

fn default_data_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".taskboard").join("data.json")
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    // Completions need no data file.
    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return;
    }

    let data_path = cli.data.unwrap_or_else(default_data_path);
    let service = match JsonFileService::open(&data_path) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Failed to open {}: {e}", data_path.display());
            std::process::exit(1);
        }
    };

    let config = match cli.timeout_ms {
        None => CacheConfig::default(),
        Some(0) => CacheConfig::default().with_timeout(None),
        Some(ms) => CacheConfig::default().with_timeout(Some(Duration::from_millis(ms))),
    };
    let cache = Cache::new(Arc::new(service), config);

    if let Err(e) = cache.load().await {
        eprintln!("Failed to load {}: {e}", data_path.display());
        std::process::exit(1);
    }

    if let Err(e) = run(&cache, cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
