//! Command line definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inkboard collaborative whiteboard client
#[derive(Parser, Debug)]
#[command(name = "inkboard")]
#[command(about = "Join Inkboard boards and render their drawing history")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a JSON array of drawing events to a PNG
    Replay(ReplayArgs),
    /// Connect to a board, follow it for a while and save a snapshot
    Join(JoinArgs),
}

#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    /// JSON file holding an array of drawing events
    pub events: PathBuf,
    #[arg(short, long, default_value = "board.png")]
    pub output: PathBuf,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// CSS background color
    #[arg(long)]
    pub background: Option<String>,
    /// Client config file (JSON); its canvas section supplies the defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    #[arg(short, long)]
    pub board: u64,
    /// Display name shown to other participants
    #[arg(short, long)]
    pub name: String,
    #[arg(long, default_value_t = 0)]
    pub user_id: u64,
    /// Avatar reference sent with cursor updates
    #[arg(long)]
    pub photo: Option<String>,
    /// How long to stay on the board
    #[arg(short, long, default_value_t = 10)]
    pub seconds: u64,
    #[arg(short, long, default_value = "board.png")]
    pub output: PathBuf,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Draw a short diagonal stroke once connected
    #[arg(long)]
    pub demo_stroke: bool,
}
