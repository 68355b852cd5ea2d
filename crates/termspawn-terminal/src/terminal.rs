//! Terminal objects.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use termspawn_core::{
    Color, Config, Dimensions, Error, Palette, PaletteColor, Result, SpawnSettings, SpawnToken,
    TerminalId, TerminalInfo, TerminalStatus,
};
use termspawn_pty::{PtyHandle, SpawnCommand};

use crate::backend::{ChildSink, PtyBackend, SpawnBackend};
use crate::correlator::{Completion, Correlator};
use crate::events::TerminalEvent;
use crate::output::OutputBuffer;

/// Capacity of the event channel; slow subscribers miss older events.
const EVENT_CAPACITY: usize = 64;

/// How long an exit waits for the output pump to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Shell used when `$SHELL` is unset.
const FALLBACK_SHELL: &str = "/bin/sh";

/// A caller's request to spawn a child into a terminal.
pub struct SpawnRequest {
    /// What to run
    pub command: SpawnCommand,
    /// Called once with `(pid, failure)`; no token is used when absent
    pub on_complete: Option<Completion>,
}

impl SpawnRequest {
    /// A request with no completion callback.
    pub fn detached(command: SpawnCommand) -> Self {
        Self {
            command,
            on_complete: None,
        }
    }

    /// A request whose outcome is reported to `on_complete`.
    pub fn with_callback<F>(command: SpawnCommand, on_complete: F) -> Self
    where
        F: FnOnce(Option<u32>, Option<Error>) + Send + 'static,
    {
        Self {
            command,
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

impl std::fmt::Debug for SpawnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnRequest")
            .field("command", &self.command)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Colors and font. Stored and validated only; nothing renders here.
#[derive(Debug, Clone)]
struct Appearance {
    palette: Palette,
    foreground: Color,
    background: Color,
    font: String,
    font_scale: f64,
}

struct TerminalInner {
    id: TerminalId,
    correlator: Arc<Correlator>,
    backend: Arc<dyn SpawnBackend>,
    spawn_settings: SpawnSettings,
    term: String,
    dimensions: Mutex<Dimensions>,
    output: Mutex<OutputBuffer>,
    appearance: Mutex<Appearance>,
    children: Mutex<Vec<Arc<PtyHandle>>>,
    events: broadcast::Sender<TerminalEvent>,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminalInner {
    fn feed(&self, bytes: &[u8]) {
        lock(&self.output).append(bytes);
    }

    fn emit(&self, event: TerminalEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn remove_child(&self, child: &Arc<PtyHandle>) {
        lock(&self.children).retain(|c| !Arc::ptr_eq(c, child));
    }
}

impl ChildSink for TerminalInner {
    fn attach(self: Arc<Self>, child: Arc<PtyHandle>) -> Result<()> {
        {
            // Checked under the children lock so `close` either sees this
            // child or this call sees the terminal closed.
            let mut children = lock(&self.children);
            if self.closed.load(Ordering::SeqCst) {
                drop(children);
                warn!(
                    "Terminal {} closed before child {:?} attached; killing it",
                    self.id,
                    child.pid()
                );
                if let Err(e) = child.kill() {
                    error!("Failed to kill orphaned child: {}", e);
                }
                return Err(Error::TerminalClosed);
            }
            children.push(Arc::clone(&child));
        }

        info!(
            "Attaching child to terminal {}: pid={:?}, command='{}'",
            self.id,
            child.pid(),
            child.label()
        );

        let (drained_tx, drained_rx) = mpsc::channel::<()>();
        match child.take_reader() {
            Ok(Some(reader)) => {
                let inner = Arc::clone(&self);
                let pump = thread::Builder::new()
                    .name("termspawn-pump".to_string())
                    .spawn(move || {
                        pump_output(reader, &inner);
                        drop(drained_tx);
                    });
                if let Err(e) = pump {
                    error!("Failed to start output pump: {}", e);
                }
            }
            Ok(None) => debug!("PTY reader already taken; not pumping output"),
            Err(e) => error!("Failed to take PTY reader: {}", e),
        }

        let inner = self;
        let watcher = thread::Builder::new()
            .name("termspawn-exit".to_string())
            .spawn(move || {
                let exit_code = match child.wait() {
                    Ok(code) => code,
                    Err(e) => {
                        error!("Failed waiting for child {:?}: {}", child.pid(), e);
                        inner.remove_child(&child);
                        return;
                    }
                };
                // Returns as soon as the pump drops its sender.
                let _ = drained_rx.recv_timeout(DRAIN_TIMEOUT);

                inner.remove_child(&child);
                info!(
                    "Child exited: terminal={}, pid={:?}, exit_code={}",
                    inner.id,
                    child.pid(),
                    exit_code
                );
                inner.emit(TerminalEvent::ChildExited {
                    pid: child.pid(),
                    exit_code,
                });
            });
        if let Err(e) = watcher {
            error!("Failed to start exit watcher: {}", e);
        }
        Ok(())
    }
}

fn pump_output(mut reader: Box<dyn Read + Send>, inner: &TerminalInner) {
    let mut buffer = [0u8; 4096];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                debug!("Read {} bytes from PTY: terminal={}", n, inner.id);
                inner.feed(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Linux reports a hung-up PTY as EIO.
            Err(e) => {
                debug!("PTY read ended: {}", e);
                break;
            }
        }
    }
}

/// A terminal: scrollback, appearance settings and the children spawned into it.
///
/// Cloning is cheap and yields another handle to the same terminal.
#[derive(Clone)]
pub struct Terminal {
    inner: Arc<TerminalInner>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("id", &self.inner.id)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Terminal {
    /// Create a terminal spawning children on native PTYs.
    pub fn new(correlator: Arc<Correlator>, config: &Config) -> Result<Self> {
        Self::with_backend(correlator, Arc::new(PtyBackend::new()), config)
    }

    /// Create a terminal with a custom spawn backend.
    pub fn with_backend(
        correlator: Arc<Correlator>,
        backend: Arc<dyn SpawnBackend>,
        config: &Config,
    ) -> Result<Self> {
        let settings = &config.terminal;
        let dimensions = Dimensions::checked(settings.rows, settings.cols)?;
        let palette = settings.palette()?;
        let appearance = Appearance {
            foreground: palette.get(PaletteColor::White),
            background: palette.get(PaletteColor::Black),
            palette,
            font: settings.font.clone(),
            font_scale: settings.font_scale,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let id = TerminalId::new();
        info!("Creating terminal: id={}, dimensions={}", id, dimensions);

        Ok(Self {
            inner: Arc::new(TerminalInner {
                id,
                correlator,
                backend,
                spawn_settings: config.spawn.clone(),
                term: settings.term.clone(),
                dimensions: Mutex::new(dimensions),
                output: Mutex::new(OutputBuffer::with_scrollback(settings.scrollback_lines)),
                appearance: Mutex::new(appearance),
                children: Mutex::new(Vec::new()),
                events,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Get the terminal ID.
    pub fn id(&self) -> &TerminalId {
        &self.inner.id
    }

    /// The correlator this terminal registers spawns with.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.inner.correlator
    }

    /// The user's shell: `$SHELL`, or `/bin/sh` when unset or empty.
    pub fn user_shell() -> String {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_SHELL.to_string())
    }

    /// Build a command carrying this terminal's spawn defaults.
    pub fn command<I, S>(&self, argv: I) -> SpawnCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SpawnCommand::from_settings(argv, &self.inner.spawn_settings)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::TerminalClosed);
        }
        Ok(())
    }

    fn prepare(&self, mut command: SpawnCommand) -> SpawnCommand {
        command
            .env
            .entry("TERM".to_string())
            .or_insert_with(|| self.inner.term.clone());
        command
    }

    /// Feed bytes to the terminal as if a child had written them.
    pub fn feed(&self, bytes: &[u8]) {
        self.inner.feed(bytes);
    }

    /// Run a command in the terminal, waiting for the spawn to finish.
    ///
    /// `PATH` is always searched. Returns the child's process id.
    pub fn fork<I, S>(&self, argv: I) -> Result<Option<u32>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        let mut command = self.prepare(self.command(argv));
        command.flags.search_path = true;
        command.validate()?;

        let dimensions = self.dimensions();
        let child = self
            .inner
            .backend
            .spawn_sync(&command, dimensions)
            .map_err(|e| match e {
                Error::SpawnFailed(_) | Error::InvalidCommand(_) => e,
                other => Error::SpawnFailed(other.to_string()),
            })?;

        let pid = child.pid();
        Arc::clone(&self.inner).attach(child)?;
        Ok(pid)
    }

    /// Start a spawn and return without waiting for it.
    ///
    /// When the request has a callback a token is registered first; if the
    /// token space is exhausted the call fails and nothing is spawned. Spawn
    /// failures are delivered to the callback. The returned token is
    /// [`SpawnToken::NONE`] for detached requests.
    pub fn spawn_async(&self, request: SpawnRequest) -> Result<SpawnToken> {
        self.ensure_open()?;
        let SpawnRequest {
            command,
            on_complete,
        } = request;
        command.validate()?;
        let command = self.prepare(command);

        let token = match on_complete {
            Some(completion) => self
                .inner
                .correlator
                .register_boxed(command.label(), completion)?,
            None => SpawnToken::NONE,
        };

        debug!(
            "Submitting spawn: terminal={}, token={}, command='{}'",
            self.inner.id,
            token,
            command.label()
        );
        let sink: Arc<dyn ChildSink> = Arc::clone(&self.inner) as Arc<dyn ChildSink>;
        self.inner.backend.spawn_async(
            command,
            self.dimensions(),
            sink,
            token,
            self.inner.correlator.trampoline(),
        );
        Ok(token)
    }

    /// Spawn a command and wait for the spawn to complete.
    ///
    /// Resolves to the child's process id once it is running.
    pub async fn spawn(&self, command: SpawnCommand) -> Result<Option<u32>> {
        let (tx, rx) = oneshot::channel();
        let request = SpawnRequest::with_callback(command, move |pid, failure| {
            let _ = tx.send(match failure {
                Some(e) => Err(e),
                None => Ok(pid),
            });
        });
        self.spawn_async(request)?;
        rx.await
            .map_err(|_| Error::SpawnFailed("spawn completion was dropped".to_string()))?
    }

    /// Send input to the most recently attached child.
    pub fn write_input(&self, data: &[u8]) -> Result<usize> {
        let child = lock(&self.inner.children)
            .last()
            .cloned()
            .ok_or_else(|| Error::InvalidInput("no child attached".to_string()))?;
        child.write(data)
    }

    /// Subscribe to terminal events.
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.inner.events.subscribe()
    }

    /// Replace the 16-color palette.
    pub fn set_colors(&self, palette: Palette) {
        lock(&self.inner.appearance).palette = palette;
    }

    /// Replace the palette from 16 color strings.
    pub fn set_colors_from_strings<S: AsRef<str>>(&self, colors: &[S]) -> Result<()> {
        self.set_colors(Palette::from_strings(colors)?);
        Ok(())
    }

    /// Current palette.
    pub fn palette(&self) -> Palette {
        lock(&self.inner.appearance).palette.clone()
    }

    /// Set the default text color.
    pub fn set_foreground(&self, color: &str) -> Result<()> {
        lock(&self.inner.appearance).foreground = Color::parse(color)?;
        Ok(())
    }

    /// Set the default background color.
    pub fn set_background(&self, color: &str) -> Result<()> {
        lock(&self.inner.appearance).background = Color::parse(color)?;
        Ok(())
    }

    /// Default text color.
    pub fn foreground(&self) -> Color {
        lock(&self.inner.appearance).foreground
    }

    /// Default background color.
    pub fn background(&self) -> Color {
        lock(&self.inner.appearance).background
    }

    /// Set the font from a description such as `"monospace 8"`.
    pub fn set_font(&self, font: &str) -> Result<()> {
        let font = font.trim();
        if font.is_empty() {
            return Err(Error::InvalidInput("empty font description".to_string()));
        }
        lock(&self.inner.appearance).font = font.to_string();
        Ok(())
    }

    /// Current font description.
    pub fn font(&self) -> String {
        lock(&self.inner.appearance).font.clone()
    }

    /// Set the font scale factor.
    pub fn set_font_scale(&self, scale: f64) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::InvalidInput(format!("invalid font scale: {scale}")));
        }
        lock(&self.inner.appearance).font_scale = scale;
        Ok(())
    }

    /// Current font scale factor.
    pub fn font_scale(&self) -> f64 {
        lock(&self.inner.appearance).font_scale
    }

    /// Set how many lines of output are retained (0 = unlimited).
    pub fn set_scrollback_lines(&self, lines: u32) {
        lock(&self.inner.output).set_scrollback_lines(lines);
    }

    /// Retained line limit.
    pub fn scrollback_lines(&self) -> u32 {
        lock(&self.inner.output).scrollback_lines()
    }

    /// Current dimensions.
    pub fn dimensions(&self) -> Dimensions {
        *lock(&self.inner.dimensions)
    }

    /// Resize the terminal and every attached child's PTY.
    pub fn resize(&self, dimensions: Dimensions) -> Result<()> {
        let dimensions = Dimensions::checked(dimensions.rows, dimensions.cols)?;
        info!("Resizing terminal {} to {}", self.inner.id, dimensions);
        let children = lock(&self.inner.children).clone();
        for child in children {
            child.resize(dimensions)?;
        }
        *lock(&self.inner.dimensions) = dimensions;
        Ok(())
    }

    /// Reset terminal state, optionally discarding scrollback.
    pub fn reset(&self, clear_tabstops: bool, clear_history: bool) {
        debug!(
            "Resetting terminal {}: tabstops={}, history={}",
            self.inner.id, clear_tabstops, clear_history
        );
        if clear_history {
            lock(&self.inner.output).clear();
        }
        self.inner.emit(TerminalEvent::Reset {
            clear_tabstops,
            clear_history,
        });
    }

    /// Everything retained, as text.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(lock(&self.inner.output).contents()).into_owned()
    }

    /// Text fed since the previous call.
    pub fn read_since_last(&self) -> String {
        String::from_utf8_lossy(&lock(&self.inner.output).read_since_last()).into_owned()
    }

    /// Process IDs of running children.
    pub fn children(&self) -> Vec<u32> {
        lock(&self.inner.children)
            .iter()
            .filter_map(|c| c.pid())
            .collect()
    }

    /// Current status.
    pub fn status(&self) -> TerminalStatus {
        if self.inner.closed.load(Ordering::SeqCst) {
            TerminalStatus::Closed
        } else if lock(&self.inner.children).is_empty() {
            TerminalStatus::Idle
        } else {
            TerminalStatus::Running
        }
    }

    /// Snapshot for listings.
    pub fn info(&self) -> TerminalInfo {
        TerminalInfo {
            id: self.inner.id,
            status: self.status(),
            dimensions: self.dimensions(),
            children: self.children(),
            pending_spawns: self.inner.correlator.pending_count(),
        }
    }

    /// Close the terminal, killing attached children.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::TerminalClosed);
        }
        info!("Closing terminal: id={}", self.inner.id);

        let children = std::mem::take(&mut *lock(&self.inner.children));
        for child in children {
            if let Err(e) = child.kill() {
                error!(
                    "Failed to kill child {:?} of terminal {}: {}",
                    child.pid(),
                    self.inner.id,
                    e
                );
            }
        }
        self.inner.emit(TerminalEvent::Closed);
        Ok(())
    }
}

/// Writes feed the terminal with `\n` expanded to `\r\n`, so a child's
/// standard output can be pointed at it.
impl io::Write for &Terminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut translated = Vec::with_capacity(buf.len() + buf.len() / 8);
        for &b in buf {
            if b == b'\n' {
                translated.push(b'\r');
            }
            translated.push(b);
        }
        self.feed(&translated);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for Terminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
