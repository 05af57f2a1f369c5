use std::path::PathBuf;

use clap::Parser;

/// Plexus semantic MCP router
#[derive(Debug, Parser)]
#[command(name = "plexus", about = "Semantic routing proxy for MCP servers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "plexus.toml", env = "PLEXUS_CONFIG")]
    pub config: PathBuf,
}
