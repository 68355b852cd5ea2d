//! termspawn command line library.
//!
//! Argument parsing and the run loop behind the binary in main.rs.

pub mod cli;

use anyhow::{bail, Context};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use termspawn_core::{Config, TerminalId};
use termspawn_terminal::{Terminal, TerminalEvent, TerminalManager};

pub use cli::CliArgs;

/// Outcome of one run, printed with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Terminal the command ran in
    pub terminal_id: TerminalId,
    /// Program and arguments actually spawned
    pub command: Vec<String>,
    /// Process id of the child
    pub pid: Option<u32>,
    /// Exit code of the child
    pub exit_code: u32,
    /// Everything the child wrote to the terminal
    pub output: String,
}

/// Load the configuration named on the command line, or the defaults.
pub fn load_config(args: &CliArgs) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Spawn the requested command into a fresh terminal and wait for it to exit.
pub async fn run(args: &CliArgs, config: Config) -> anyhow::Result<RunReport> {
    let manager = TerminalManager::new(config)?;
    let terminal = manager.create_terminal()?;
    let mut events = terminal.subscribe();

    let argv = if args.command.is_empty() {
        vec![Terminal::user_shell()]
    } else {
        args.command.clone()
    };

    let mut command = terminal.command(argv.clone());
    if let Some(timeout) = args.timeout {
        command = command.timeout(timeout);
    }
    if let Some(cwd) = &args.cwd {
        command = command.cwd(cwd.clone());
    }

    let pid = terminal
        .spawn(command)
        .await
        .with_context(|| format!("failed to spawn '{}'", argv.join(" ")))?;
    info!("Spawned '{}': pid={:?}", argv.join(" "), pid);

    let exit_code = loop {
        match events.recv().await {
            Ok(TerminalEvent::ChildExited {
                pid: exited,
                exit_code,
            }) if exited == pid => break exit_code,
            Ok(event) => debug!("Ignoring event {:?}", event),
            Err(RecvError::Lagged(n)) => warn!("Missed {} terminal events", n),
            Err(RecvError::Closed) => bail!("terminal closed before the child exited"),
        }
    };

    let report = RunReport {
        terminal_id: *terminal.id(),
        command: argv,
        pid,
        exit_code,
        output: terminal.contents(),
    };
    manager.close_all();

    Ok(report)
}
