//! Module cache CLI - seed and inspect a local module cache directory
//!
//! Reads, stores and bulk-ingests entries through the same `Cacher`
//! contract a module proxy uses, against a `DirCacher` rooted at
//! `CACHE_DIR` (or `--cache-dir`).

mod cli;
mod commands;
mod error;

use crate::cli::{Cli, Command};
use crate::error::Result;
use clap::Parser;
use module_cache::{CancellationToken, Cacher, DirCacher, DirCacherConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging (stderr, so `get` can stream to stdout)
    let env_filter = EnvFilter::from_default_env()
        .add_directive("module_cache=info".parse()?)
        .add_directive("module_cache_cli=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let config = load_config(cli.cache_dir.clone());
    info!("Cache dir: {:?}", config.cache_dir);

    let cacher = DirCacher::from_config(&config);
    cacher.init().await?;

    // Ctrl-C stops a running sync between entries
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match run(cli.command, &cacher, &cancel).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if e.is_not_found() => {
            warn!(error = %e, "Entry is not cached");
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e),
    }
}

async fn run(command: Command, cacher: &dyn Cacher, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Get { name } => {
            commands::get(cacher, cancel, &name, &mut tokio::io::stdout()).await?;
        }
        Command::Put { name, file } => {
            commands::put(cacher, cancel, &name, &file).await?;
        }
        Command::Sync { archive, kind } => {
            let report = commands::sync(cacher, cancel, &archive, kind.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// `--cache-dir` wins over `CACHE_DIR`
fn load_config(cache_dir_flag: Option<PathBuf>) -> DirCacherConfig {
    match cache_dir_flag {
        Some(cache_dir) => DirCacherConfig { cache_dir },
        None => DirCacherConfig::from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_overrides_environment() {
        let config = load_config(Some(PathBuf::from("/tmp/flag-cache")));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/flag-cache"));
    }
}
