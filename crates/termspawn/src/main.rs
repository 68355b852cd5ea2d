//! # termspawn
//!
//! Runs a command inside a terminal using token-correlated asynchronous
//! spawning, then prints what the command wrote.
//!
//! ## Architecture
//!
//! This is Layer 3 - the binary that ties together:
//! - termspawn-core: Core types and configuration
//! - termspawn-pty: PTY process spawning
//! - termspawn-terminal: Correlator, terminals and the terminal manager

use std::io::Write;

use clap::Parser;

use termspawn::{load_config, run, CliArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = load_config(&args)?;

    // Initialize logging on stderr so stdout carries only the child's output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("termspawn v{} starting", env!("CARGO_PKG_VERSION"));

    let report = run(&args, config).await.map_err(|e| {
        tracing::error!("Run failed: {:#}", e);
        e
    })?;

    let mut stdout = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(report.output.as_bytes())?;
    }
    stdout.flush()?;

    tracing::info!(
        "Child {:?} exited with code {}",
        report.pid,
        report.exit_code
    );

    std::process::exit(report.exit_code as i32);
}
