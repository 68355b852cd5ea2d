//! Spawn backends.
//!
//! A backend starts child processes for a terminal. Asynchronous spawns report
//! back exclusively through a [`Trampoline`] and the token they were given.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use termspawn_core::{Dimensions, Error, Result, SpawnToken};
use termspawn_pty::{PtyHandle, SpawnCommand};

use crate::correlator::Trampoline;

/// Receives children a backend has started.
pub trait ChildSink: Send + Sync {
    /// Take ownership of a freshly spawned child.
    ///
    /// Called before the spawn's completion is reported. On error the sink has
    /// disposed of the child and the spawn is reported as failed.
    fn attach(self: Arc<Self>, child: Arc<PtyHandle>) -> Result<()>;
}

/// Process-spawn facility used by terminals.
pub trait SpawnBackend: Send + Sync {
    /// Spawn a child and wait for the outcome.
    fn spawn_sync(&self, command: &SpawnCommand, dimensions: Dimensions) -> Result<Arc<PtyHandle>>;

    /// Start a spawn and return immediately.
    ///
    /// Implementations must call `trampoline.fire(token, ..)` exactly once per
    /// call, from any thread, after handing a successful child to `sink`.
    fn spawn_async(
        &self,
        command: SpawnCommand,
        dimensions: Dimensions,
        sink: Arc<dyn ChildSink>,
        token: SpawnToken,
        trampoline: Trampoline,
    );
}

/// Starts one child on a PTY.
pub type SpawnFn = fn(&SpawnCommand, Dimensions) -> Result<PtyHandle>;

/// Backend spawning children on native PTYs.
#[derive(Clone, Copy)]
pub struct PtyBackend {
    spawner: SpawnFn,
}

impl std::fmt::Debug for PtyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyBackend").finish_non_exhaustive()
    }
}

impl PtyBackend {
    /// Create a new PTY backend.
    pub fn new() -> Self {
        Self::with_spawner(PtyHandle::spawn)
    }

    /// Create a backend that starts children with `spawner`.
    pub fn with_spawner(spawner: SpawnFn) -> Self {
        Self { spawner }
    }

    fn complete(
        result: Result<Arc<PtyHandle>>,
        sink: Arc<dyn ChildSink>,
        token: SpawnToken,
        trampoline: &Trampoline,
    ) {
        match result {
            Ok(pty) => {
                let pid = pty.pid();
                match sink.attach(pty) {
                    Ok(()) => trampoline.fire(token, pid, None),
                    Err(e) => {
                        warn!("Spawn {} succeeded but the child was rejected: {}", token, e);
                        trampoline.fire(token, None, Some(e));
                    }
                }
            }
            Err(e) => {
                error!("Asynchronous spawn {} failed: {}", token, e);
                trampoline.fire(token, None, Some(e));
            }
        }
    }
}

impl SpawnBackend for PtyBackend {
    fn spawn_sync(&self, command: &SpawnCommand, dimensions: Dimensions) -> Result<Arc<PtyHandle>> {
        (self.spawner)(command, dimensions).map(Arc::new)
    }

    fn spawn_async(
        &self,
        command: SpawnCommand,
        dimensions: Dimensions,
        sink: Arc<dyn ChildSink>,
        token: SpawnToken,
        trampoline: Trampoline,
    ) {
        let label = command.label();
        let timeout = command.timeout;
        debug!(
            "Starting asynchronous spawn {}: command='{}', timeout={:?}",
            token, label, timeout
        );

        let (tx, rx) = mpsc::channel::<Result<Arc<PtyHandle>>>();

        // The waiter starts first so that no child can be spawned without
        // someone to attach or kill it.
        let waiter = thread::Builder::new()
            .name(format!("termspawn-wait-{}", token.raw()))
            .spawn({
                let trampoline = trampoline.clone();
                move || {
                    let Some(limit) = timeout else {
                        let result = rx.recv().unwrap_or_else(|_| {
                            Err(Error::SpawnFailed("spawn worker exited".to_string()))
                        });
                        Self::complete(result, sink, token, &trampoline);
                        return;
                    };

                    match rx.recv_timeout(limit) {
                        Ok(result) => Self::complete(result, sink, token, &trampoline),
                        Err(RecvTimeoutError::Timeout) => {
                            let ms = limit.as_millis() as u64;
                            warn!("Spawn {} ('{}') timed out after {}ms", token, label, ms);
                            trampoline.fire(token, None, Some(Error::SpawnTimeout(ms)));

                            if let Ok(Ok(late)) = rx.recv() {
                                info!(
                                    "Killing late child of timed-out spawn {}: pid={:?}",
                                    token,
                                    late.pid()
                                );
                                if let Err(e) = late.kill() {
                                    error!("Failed to kill late child: {}", e);
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            trampoline.fire(
                                token,
                                None,
                                Some(Error::SpawnFailed("spawn worker exited".to_string())),
                            );
                        }
                    }
                }
            });

        if let Err(e) = waiter {
            error!("Failed to start spawn waiter for {}: {}", token, e);
            trampoline.fire(token, None, Some(Error::Io(e)));
            return;
        }

        let spawner = self.spawner;
        let worker = thread::Builder::new()
            .name(format!("termspawn-spawn-{}", token.raw()))
            .spawn(move || {
                let result = spawner(&command, dimensions).map(Arc::new);
                // The waiting side may already have given up.
                let _ = tx.send(result);
            });

        // A worker that never started drops its sender; the waiter reports it.
        if let Err(e) = worker {
            error!("Failed to start spawn worker for {}: {}", token, e);
        }
    }
}

impl Default for PtyBackend {
    fn default() -> Self {
        Self::new()
    }
}
