//! Main application entry point.

use anyhow::Result;
use clap::Parser;
use inkboard_app::{Cli, Commands, commands};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    log::info!("Starting Inkboard v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Replay(args) => commands::replay(args),
        Commands::Join(args) => commands::join(args),
    }
}
