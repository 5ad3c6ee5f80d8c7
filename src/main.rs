//! querypad - Run small query programs over files and documents
//!
//! querypad provides:
//! - Line, stream and full-text views of a file or document
//! - Printable-string extraction for binary files
//! - A sequence operator library (distinct, groupBy, sortBy, ...)
//! - Result messages as jsonl/json/raw, streamed with cancellation

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod core;
mod ops;
mod result;
mod sandbox;
mod source;

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.log_level());
    cli::run(cli)
}
