//! Spawn command description and its marshaling into a PTY command.

use portable_pty::CommandBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use termspawn_core::{Error, Result, SpawnSettings};

/// Flags steering how the spawn facility starts the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnFlags {
    /// Resolve a bare program name through `PATH`
    pub search_path: bool,
    /// Start from the parent's environment instead of an empty one
    pub inherit_env: bool,
}

impl Default for SpawnFlags {
    fn default() -> Self {
        Self {
            search_path: true,
            inherit_env: true,
        }
    }
}

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnCommand {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Environment variables set on top of the base environment
    pub env: BTreeMap<String, String>,
    /// Working directory; inherits the parent's when `None`
    pub working_directory: Option<PathBuf>,
    /// How long the spawn facility may take before giving up
    pub timeout: Option<Duration>,
    /// Spawn flags
    pub flags: SpawnFlags,
}

impl SpawnCommand {
    /// Create a command from an argument vector.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            working_directory: None,
            timeout: None,
            flags: SpawnFlags::default(),
        }
    }

    /// Create a command whose flags, timeout and extra env come from settings.
    pub fn from_settings<I, S>(argv: I, settings: &SpawnSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = Self::new(argv);
        cmd.env = settings.env.clone();
        cmd.timeout = settings.default_timeout();
        cmd.flags = SpawnFlags {
            search_path: settings.search_path,
            inherit_env: settings.inherit_env,
        };
        cmd
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the spawn timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the spawn flags.
    pub fn flags(mut self, flags: SpawnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Program name (first argv entry).
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Short human-readable description, for logs.
    pub fn label(&self) -> String {
        const MAX: usize = 64;
        let joined = self.argv.join(" ");
        if joined.chars().count() <= MAX {
            joined
        } else {
            let mut cut: String = joined.chars().take(MAX).collect();
            cut.push('…');
            cut
        }
    }

    /// Check that the command is well formed.
    pub fn validate(&self) -> Result<()> {
        let program = self
            .program()
            .ok_or_else(|| Error::InvalidCommand("empty argv".to_string()))?;
        if program.is_empty() {
            return Err(Error::InvalidCommand("empty program name".to_string()));
        }
        if self.argv.iter().any(|a| a.contains('\0')) {
            return Err(Error::InvalidCommand(
                "argument contains a NUL byte".to_string(),
            ));
        }
        if self
            .env
            .iter()
            .any(|(k, v)| k.is_empty() || k.contains('=') || k.contains('\0') || v.contains('\0'))
        {
            return Err(Error::InvalidCommand(
                "malformed environment entry".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the parts of the command that depend on the filesystem.
    ///
    /// Failures here are spawn failures rather than malformed commands.
    pub fn check_spawnable(&self) -> Result<()> {
        let program = self.program().unwrap_or_default();
        if let Some(dir) = &self.working_directory {
            if !dir.is_dir() {
                return Err(Error::SpawnFailed(format!(
                    "working directory {} does not exist",
                    dir.display()
                )));
            }
        }
        if !self.flags.search_path && !Path::new(program).is_file() {
            return Err(Error::SpawnFailed(format!(
                "{program}: No such file or directory"
            )));
        }
        Ok(())
    }

    /// Marshal into a `portable_pty` command.
    pub fn to_command_builder(&self) -> Result<CommandBuilder> {
        self.validate()?;
        self.check_spawnable()?;

        let mut cmd = CommandBuilder::from_argv(self.argv.iter().map(Into::into).collect());
        if !self.flags.inherit_env {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.working_directory {
            cmd.cwd(dir);
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_new_collects_argv() {
        let cmd = SpawnCommand::new(["sh", "-c", "echo hi"]);
        assert_eq!(cmd.argv, vec!["sh", "-c", "echo hi"]);
        assert_eq!(cmd.program(), Some("sh"));
        assert!(cmd.flags.search_path);
    }

    #[test]
    fn test_empty_argv_rejected() {
        let cmd = SpawnCommand::new(Vec::<String>::new());
        assert!(matches!(cmd.validate(), Err(Error::InvalidCommand(_))));

        let cmd = SpawnCommand::new([""]);
        assert!(matches!(cmd.validate(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_nul_bytes_rejected() {
        let cmd = SpawnCommand::new(["echo", "a\0b"]);
        assert!(matches!(cmd.validate(), Err(Error::InvalidCommand(_))));

        let cmd = SpawnCommand::new(["echo"]).env("BAD=KEY", "x");
        assert!(matches!(cmd.validate(), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_missing_working_directory() {
        let cmd = SpawnCommand::new(["echo"]).cwd("/definitely/not/here");
        assert!(cmd.validate().is_ok());
        assert!(matches!(cmd.check_spawnable(), Err(Error::SpawnFailed(_))));
    }

    #[test]
    fn test_no_search_path_requires_existing_file() {
        let cmd = SpawnCommand::new(["sh"]).flags(SpawnFlags {
            search_path: false,
            inherit_env: true,
        });
        assert!(matches!(cmd.check_spawnable(), Err(Error::SpawnFailed(_))));
        assert!(matches!(cmd.to_command_builder(), Err(Error::SpawnFailed(_))));
    }

    #[test]
    fn test_label_is_truncated() {
        let long = "x".repeat(200);
        let cmd = SpawnCommand::new(["echo", long.as_str()]);
        let label = cmd.label();
        assert_eq!(label.chars().count(), 65);
        assert!(label.ends_with('…'));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = SpawnSettings::default();
        settings.default_timeout_ms = 300;
        settings.inherit_env = false;
        settings.env.insert("LANG".into(), "C".into());

        let cmd = SpawnCommand::from_settings(["true"], &settings);
        assert_eq!(cmd.timeout, Some(Duration::from_millis(300)));
        assert!(!cmd.flags.inherit_env);
        assert_eq!(cmd.env.get("LANG").map(String::as_str), Some("C"));
    }

    #[test]
    fn test_command_builder_marshaling() {
        let cmd = SpawnCommand::new(["sh", "-c", "echo hi"]).env("FOO", "bar");
        let builder = cmd.to_command_builder().unwrap();
        let argv: Vec<&OsStr> = builder.get_argv().iter().map(|a| a.as_os_str()).collect();
        assert_eq!(argv, vec!["sh", "-c", "echo hi"]);
        assert_eq!(builder.get_env("FOO"), Some(OsStr::new("bar")));
    }
}
