//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "module-cache",
    version,
    about = "Seed and inspect a local module cache directory"
)]
pub struct Cli {
    /// Cache root directory (overrides CACHE_DIR)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a cached entry to stdout
    Get {
        /// Logical name, e.g. golang.org/x/text/@v/list
        name: String,
    },
    /// Store a file under a logical name
    Put { name: String, file: PathBuf },
    /// Ingest a tar or tar.gz archive into the cache ("-" reads stdin)
    Sync {
        archive: PathBuf,
        /// Media type of the archive: application/x-tar or application/gzip
        #[arg(long)]
        kind: Option<String>,
    },
}
