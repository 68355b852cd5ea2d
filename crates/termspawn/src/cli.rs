//! Command line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Spawn COMMAND (default: $SHELL) in a terminal and print its output once it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "termspawn", version)]
#[command(about = "Spawn a command in a terminal and print its output once it exits.", long_about = None)]
pub struct CliArgs {
    /// YAML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Spawn timeout in milliseconds
    #[arg(short = 't', long, value_name = "MS", value_parser = parse_millis)]
    pub timeout: Option<Duration>,

    /// Working directory for the child
    #[arg(short = 'C', long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Print a JSON report instead of raw output
    #[arg(long)]
    pub json: bool,

    /// Program and arguments; empty means the user's shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| format!("invalid timeout '{raw}': {e}"))
}
