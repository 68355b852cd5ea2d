//! Spawn correlation.
//!
//! A spawn backend reports completion through a [`Trampoline`] that carries
//! nothing but a [`SpawnToken`]. The [`Correlator`] hands out those tokens and
//! maps each back to the completion callback registered for it.
//!
//! Tokens are unique among pending spawns only. Once a spawn resolves its token
//! may be handed out again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use termspawn_core::{Error, RawToken, Result, SpawnToken};

/// Callback invoked once with `(process id, failure)` when a spawn completes.
pub type Completion = Box<dyn FnOnce(Option<u32>, Option<Error>) + Send + 'static>;

/// One in-flight spawn awaiting its completion.
struct PendingSpawn {
    completion: Completion,
    label: String,
    registered_at: Instant,
}

/// Diagnostic view of a pending spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    /// Token held by the spawn
    pub token: SpawnToken,
    /// Command description given at registration
    pub label: String,
    /// Time since registration
    pub age: Duration,
}

/// Maps spawn tokens to completion callbacks.
///
/// All access to the map goes through one mutex, which is never held while a
/// completion runs. A completion may therefore register new spawns on the same
/// correlator.
pub struct Correlator {
    pending: Mutex<HashMap<RawToken, PendingSpawn>>,
    max_token: RawToken,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("max_token", &self.max_token)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Correlator {
    /// Create a correlator using the whole token space.
    pub fn new() -> Self {
        Self::with_max_token(RawToken::MAX)
    }

    /// Create a correlator handing out tokens in `1..=max_token`.
    pub fn with_max_token(max_token: RawToken) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            max_token,
        }
    }

    /// Number of usable tokens.
    pub fn capacity(&self) -> RawToken {
        self.max_token
    }

    // Completions run outside the lock, so a panic there cannot leave the map
    // half-updated. Recovering from poisoning is safe.
    fn lock(&self) -> MutexGuard<'_, HashMap<RawToken, PendingSpawn>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a completion and return the token that will resolve it.
    ///
    /// Scans upward from 1 for the first token not held by a pending spawn.
    /// Fails with [`Error::TokenSpaceExhausted`] when every token is taken, in
    /// which case nothing is stored.
    pub fn register<F>(&self, label: impl Into<String>, completion: F) -> Result<SpawnToken>
    where
        F: FnOnce(Option<u32>, Option<Error>) + Send + 'static,
    {
        self.register_boxed(label.into(), Box::new(completion))
    }

    /// [`register`](Self::register) for an already boxed completion.
    pub fn register_boxed(&self, label: String, completion: Completion) -> Result<SpawnToken> {
        let mut pending = self.lock();

        if pending.len() as u64 >= u64::from(self.max_token) {
            warn!(
                "Spawn token space exhausted: {} pending, label='{}'",
                pending.len(),
                label
            );
            return Err(Error::TokenSpaceExhausted {
                capacity: self.max_token,
            });
        }

        let raw = (1..=self.max_token)
            .find(|candidate| !pending.contains_key(candidate))
            .ok_or(Error::TokenSpaceExhausted {
                capacity: self.max_token,
            })?;

        pending.insert(
            raw,
            PendingSpawn {
                completion,
                label,
                registered_at: Instant::now(),
            },
        );
        debug!("Registered spawn token #{} ({} pending)", raw, pending.len());

        Ok(SpawnToken::from_raw(raw))
    }

    /// Resolve a token, invoking its completion with `(pid, failure)`.
    ///
    /// Returns `false` without side effects when the token is zero, was never
    /// issued, or has already been resolved.
    pub fn resolve(&self, token: SpawnToken, pid: Option<u32>, failure: Option<Error>) -> bool {
        if token.is_none() {
            debug!("Ignoring completion for the zero token");
            return false;
        }

        let entry = self.lock().remove(&token.raw());

        match entry {
            Some(spawn) => {
                debug!(
                    "Resolving spawn token {} ('{}') after {:?}: pid={:?}, failed={}",
                    token,
                    spawn.label,
                    spawn.registered_at.elapsed(),
                    pid,
                    failure.is_some()
                );
                (spawn.completion)(pid, failure);
                true
            }
            None => {
                warn!(
                    "Completion for unknown or already resolved spawn token {}",
                    token
                );
                false
            }
        }
    }

    /// Handle a spawn backend uses to report completion.
    pub fn trampoline(self: &Arc<Self>) -> Trampoline {
        Trampoline {
            correlator: Arc::clone(self),
        }
    }

    /// Number of spawns awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether a token is currently held by a pending spawn.
    pub fn is_pending(&self, token: SpawnToken) -> bool {
        self.lock().contains_key(&token.raw())
    }

    /// Snapshot of pending spawns, oldest first.
    pub fn pending(&self) -> Vec<PendingInfo> {
        let mut infos: Vec<PendingInfo> = self
            .lock()
            .iter()
            .map(|(raw, spawn)| PendingInfo {
                token: SpawnToken::from_raw(*raw),
                label: spawn.label.clone(),
                age: spawn.registered_at.elapsed(),
            })
            .collect();
        infos.sort_by(|a, b| b.age.cmp(&a.age).then(a.token.cmp(&b.token)));
        infos
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (raw, spawn) in pending.iter() {
            warn!(
                "Spawn token #{} ('{}') never completed; dropped after {:?}",
                raw,
                spawn.label,
                spawn.registered_at.elapsed()
            );
        }
    }
}

/// Completion entry point handed to spawn backends.
///
/// Carries only a reference to the correlator; the token travels alongside.
#[derive(Debug, Clone)]
pub struct Trampoline {
    correlator: Arc<Correlator>,
}

impl Trampoline {
    /// Report the outcome of the spawn identified by `token`.
    ///
    /// May be called from any thread. Calls for a zero or stale token are
    /// absorbed.
    pub fn fire(&self, token: SpawnToken, pid: Option<u32>, failure: Option<Error>) {
        self.correlator.resolve(token, pid, failure);
    }

    /// [`fire`](Self::fire) with a raw slot value.
    pub fn fire_raw(&self, raw: RawToken, pid: Option<u32>, failure: Option<Error>) {
        self.fire(SpawnToken::from_raw(raw), pid, failure);
    }
}
