//! PTY (Pseudo-Terminal) handling with portable-pty.

use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use termspawn_core::{Dimensions, Error, Result};

use crate::command::SpawnCommand;

/// Interval between exit polls in [`PtyHandle::wait`].
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Handle to a child process running on its own PTY.
pub struct PtyHandle {
    /// The master PTY end
    master: Mutex<Box<dyn MasterPty + Send>>,
    /// The child process
    child: Mutex<Box<dyn Child + Send + Sync>>,
    /// Kills the child without taking the `child` lock
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    /// PTY writer
    writer: Mutex<Box<dyn Write + Send>>,
    /// PTY reader, until someone takes it for pumping
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    /// Current PTY dimensions
    dimensions: Mutex<Dimensions>,
    /// Exit code, once observed
    exit_code: Mutex<Option<u32>>,
    pid: Option<u32>,
    label: String,
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("pid", &self.pid)
            .field("label", &self.label)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::PtyError(format!("Lock error: {e}"))
}

impl PtyHandle {
    /// Spawn a new PTY running `command` with the given dimensions.
    ///
    /// # Example
    /// ```no_run
    /// use termspawn_pty::{PtyHandle, SpawnCommand};
    /// use termspawn_core::Dimensions;
    ///
    /// # fn example() -> termspawn_core::Result<()> {
    /// let cmd = SpawnCommand::new(["sh", "-c", "echo hi"]);
    /// let pty = PtyHandle::spawn(&cmd, Dimensions::new(24, 80))?;
    /// println!("child pid: {:?}", pty.pid());
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(command: &SpawnCommand, dimensions: Dimensions) -> Result<Self> {
        let label = command.label();
        info!(
            "Spawning PTY: command='{}', dimensions={}, cwd={:?}",
            label, dimensions, command.working_directory
        );

        let builder = command.to_command_builder()?;

        let pty_system = native_pty_system();
        let pty_size = PtySize {
            rows: dimensions.rows,
            cols: dimensions.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        debug!("Opening PTY with native system");
        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::PtyError(format!("Failed to open PTY: {e}"))
        })?;

        let child = pair.slave.spawn_command(builder).map_err(|e| {
            error!("Failed to spawn command '{}': {}", label, e);
            Error::SpawnFailed(e.to_string())
        })?;
        // The slave end belongs to the child now; holding it would keep
        // the reader from ever seeing EOF.
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::PtyError(format!("Failed to take writer: {e}"))
        })?;

        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::PtyError(format!("Failed to clone reader: {e}"))
        })?;

        let pid = child.process_id();
        let killer = child.clone_killer();
        info!("PTY spawned successfully: command='{}', pid={:?}", label, pid);

        Ok(Self {
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            killer: Mutex::new(killer),
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            dimensions: Mutex::new(dimensions),
            exit_code: Mutex::new(None),
            pid,
            label,
        })
    }

    /// OS process id of the child, if the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Description of the spawned command.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Take the PTY reader. Only the first call returns `Some`.
    pub fn take_reader(&self) -> Result<Option<Box<dyn Read + Send>>> {
        Ok(self.reader.lock().map_err(lock_err)?.take())
    }

    /// Write data to the PTY.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        debug!("Writing {} bytes to PTY", data.len());
        let mut writer = self.writer.lock().map_err(lock_err)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(data.len())
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, new_dimensions: Dimensions) -> Result<()> {
        info!("Resizing PTY to {}", new_dimensions);
        let master = self.master.lock().map_err(lock_err)?;
        master
            .resize(PtySize {
                rows: new_dimensions.rows,
                cols: new_dimensions.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyError(format!("Resize failed: {e}")))?;

        *self.dimensions.lock().map_err(lock_err)? = new_dimensions;
        Ok(())
    }

    /// Get current PTY dimensions.
    pub fn dimensions(&self) -> Result<Dimensions> {
        Ok(*self.dimensions.lock().map_err(lock_err)?)
    }

    /// Poll the child once; returns the exit code if it has exited.
    pub fn try_wait(&self) -> Result<Option<u32>> {
        let mut exit_code = self.exit_code.lock().map_err(lock_err)?;
        if exit_code.is_some() {
            return Ok(*exit_code);
        }
        let mut child = self.child.lock().map_err(lock_err)?;
        if let Some(status) = child.try_wait()? {
            *exit_code = Some(status.exit_code());
        }
        Ok(*exit_code)
    }

    /// Check if the child process is still running.
    pub fn is_alive(&self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// Block until the child exits and return its exit code.
    ///
    /// Polls rather than blocking inside the child lock, so `kill` and
    /// `is_alive` stay usable from other threads meanwhile.
    pub fn wait(&self) -> Result<u32> {
        loop {
            if let Some(code) = self.try_wait()? {
                debug!("PTY child exited: pid={:?}, code={}", self.pid, code);
                return Ok(code);
            }
            thread::sleep(WAIT_POLL);
        }
    }

    /// Kill the child process.
    pub fn kill(&self) -> Result<()> {
        info!("Killing PTY process: pid={:?}", self.pid);
        if !self.is_alive() {
            return Ok(());
        }
        let mut killer = self.killer.lock().map_err(lock_err)?;
        killer
            .kill()
            .map_err(|e| Error::PtyError(format!("Kill failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell() -> SpawnCommand {
        SpawnCommand::new(["/bin/sh"])
    }

    #[test]
    fn test_pty_spawn() {
        let pty = PtyHandle::spawn(&shell(), Dimensions::new(24, 80)).unwrap();
        assert!(pty.is_alive());
        assert!(pty.pid().is_some());
        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_spawn_missing_program() {
        let cmd = SpawnCommand::new(["/no/such/program"]);
        let result = PtyHandle::spawn(&cmd, Dimensions::new(24, 80));
        assert!(result.is_err());
    }

    #[test]
    fn test_pty_dimensions_and_resize() {
        let pty = PtyHandle::spawn(&shell(), Dimensions::new(30, 100)).unwrap();
        assert_eq!(pty.dimensions().unwrap(), Dimensions::new(30, 100));

        pty.resize(Dimensions::new(40, 120)).unwrap();
        assert_eq!(pty.dimensions().unwrap(), Dimensions::new(40, 120));
        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_wait_returns_exit_code() {
        let cmd = SpawnCommand::new(["sh", "-c", "exit 3"]);
        let pty = PtyHandle::spawn(&cmd, Dimensions::new(24, 80)).unwrap();
        assert_eq!(pty.wait().unwrap(), 3);
        assert!(!pty.is_alive());
    }

    #[test]
    fn test_pty_write_and_read() {
        let pty = PtyHandle::spawn(&shell(), Dimensions::new(24, 80)).unwrap();
        let mut reader = pty.take_reader().unwrap().unwrap();
        assert!(pty.take_reader().unwrap().is_none());

        pty.write(b"echo hello\n").unwrap();

        let mut buffer = [0u8; 4096];
        let n = reader.read(&mut buffer).unwrap();
        assert!(n > 0);
        pty.kill().unwrap();
    }

    #[test]
    fn test_pty_kill() {
        let pty = PtyHandle::spawn(&SpawnCommand::new(["sleep", "30"]), Dimensions::new(24, 80))
            .unwrap();
        assert!(pty.is_alive());

        pty.kill().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pty.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!pty.is_alive());
    }
}
