//! `gap` — a CLI host for the GAP playback engine.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gap_cli::cli::Args;
use gap_cli::runtime;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,gap=info")))
        .init();

    runtime::run(args)
}
