//! Command line arguments

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "comsrv", version, about = "VoltageEMS edge runtime")]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, env = "COMSRV_CONFIG", default_value = "config/edge.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error), RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Also write daily rolling log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}
