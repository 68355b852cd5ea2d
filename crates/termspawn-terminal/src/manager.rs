//! Terminal manager for coordinating multiple terminals.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use termspawn_core::{Config, CorrelatorScope, Error, Result, TerminalId, TerminalInfo};

use crate::backend::{PtyBackend, SpawnBackend};
use crate::correlator::Correlator;
use crate::terminal::Terminal;

/// Owns a set of terminals and the correlator(s) their spawns use.
pub struct TerminalManager {
    terminals: RwLock<HashMap<TerminalId, Arc<Terminal>>>,
    config: Config,
    shared: Arc<Correlator>,
    backend: Arc<dyn SpawnBackend>,
}

impl TerminalManager {
    /// Create a manager spawning on native PTYs.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_backend(config, Arc::new(PtyBackend::new()))
    }

    /// Create a manager with a custom spawn backend.
    pub fn with_backend(config: Config, backend: Arc<dyn SpawnBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            terminals: RwLock::new(HashMap::new()),
            shared: Arc::new(Correlator::with_max_token(config.spawn.max_token)),
            config,
            backend,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TerminalId, Arc<Terminal>>> {
        self.terminals.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TerminalId, Arc<Terminal>>> {
        self.terminals.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The correlator shared by terminals under [`CorrelatorScope::Shared`].
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.shared
    }

    /// Create a new terminal.
    pub fn create_terminal(&self) -> Result<Arc<Terminal>> {
        let mut terminals = self.write();
        let max = self.config.general.max_terminals;
        if terminals.len() >= max {
            warn!("Terminal limit reached: {}", max);
            return Err(Error::TerminalLimitReached(max));
        }

        let correlator = match self.config.spawn.correlator_scope {
            CorrelatorScope::Shared => Arc::clone(&self.shared),
            CorrelatorScope::PerTerminal => {
                Arc::new(Correlator::with_max_token(self.config.spawn.max_token))
            }
        };
        let terminal = Arc::new(Terminal::with_backend(
            correlator,
            Arc::clone(&self.backend),
            &self.config,
        )?);
        terminals.insert(*terminal.id(), Arc::clone(&terminal));
        info!(
            "Terminal created: id={}, total={}",
            terminal.id(),
            terminals.len()
        );

        Ok(terminal)
    }

    /// Get a terminal by ID.
    pub fn get(&self, id: &TerminalId) -> Result<Arc<Terminal>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or(Error::TerminalNotFound(*id))
    }

    /// List all terminals.
    pub fn list(&self) -> Vec<TerminalInfo> {
        self.read().values().map(|t| t.info()).collect()
    }

    /// Close a terminal and forget it.
    pub fn close(&self, id: &TerminalId) -> Result<()> {
        let terminal = self
            .write()
            .remove(id)
            .ok_or(Error::TerminalNotFound(*id))?;
        terminal.close()
    }

    /// Close all terminals.
    pub fn close_all(&self) {
        let terminals: Vec<Arc<Terminal>> = self.write().drain().map(|(_, t)| t).collect();
        for terminal in terminals {
            if let Err(e) = terminal.close() {
                warn!("Failed to close terminal {}: {}", terminal.id(), e);
            }
        }
    }

    /// Get the number of terminals.
    pub fn count(&self) -> usize {
        self.read().len()
    }
}

impl Drop for TerminalManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
