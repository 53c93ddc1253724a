//! Codevolve - LLM-driven JavaScript modernisation CLI
//!
//! Finds functions with legacy patterns, asks a model to rewrite them, and
//! keeps only rewrites that pass a syntax check.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codevolve={}", cli.log_level)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run(cli)
}
