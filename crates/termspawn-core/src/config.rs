//! Configuration types for termspawn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::{Dimensions, Error, Palette, RawToken};

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralSettings,
    /// Spawn settings
    pub spawn: SpawnSettings,
    /// Terminal settings
    pub terminal: TerminalSettings,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.general.max_terminals == 0 {
            return Err(Error::Config("general.max_terminals must be > 0".into()));
        }

        if self.spawn.max_token == 0 {
            return Err(Error::Config("spawn.max_token must be > 0".into()));
        }

        if self.terminal.rows == 0 || self.terminal.cols == 0 {
            return Err(Error::Config("terminal dimensions must be > 0".into()));
        }

        if !self.terminal.font_scale.is_finite() || self.terminal.font_scale <= 0.0 {
            return Err(Error::Config("terminal.font_scale must be > 0".into()));
        }

        self.terminal
            .palette()
            .map_err(|e| Error::Config(format!("terminal.palette: {e}")))?;

        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum number of live terminals
    pub max_terminals: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_terminals: 10,
        }
    }
}

/// Whether terminals share one correlator or each get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelatorScope {
    /// One correlator for every terminal of a manager
    #[default]
    Shared,
    /// A fresh correlator per terminal
    PerTerminal,
}

/// Spawn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// Largest token a correlator may hand out
    pub max_token: RawToken,
    /// Spawn timeout in milliseconds (0 = no timeout)
    pub default_timeout_ms: u64,
    /// Look the program up in `PATH`
    pub search_path: bool,
    /// Start children with the parent's environment
    pub inherit_env: bool,
    /// Correlator sharing between terminals
    pub correlator_scope: CorrelatorScope,
    /// Extra environment applied to every child
    pub env: BTreeMap<String, String>,
}

impl SpawnSettings {
    /// Default timeout, if any.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            max_token: RawToken::MAX,
            default_timeout_ms: 0,
            search_path: true,
            inherit_env: true,
            correlator_scope: CorrelatorScope::Shared,
            env: BTreeMap::new(),
        }
    }
}

/// Terminal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Default terminal rows
    pub rows: u16,
    /// Default terminal columns
    pub cols: u16,
    /// Retained output lines (0 = unlimited)
    pub scrollback_lines: u32,
    /// TERM environment variable value
    pub term: String,
    /// Font description, e.g. "monospace 8"
    pub font: String,
    /// Font scale factor
    pub font_scale: f64,
    /// Optional 16-entry palette; the built-in palette is used when absent
    pub palette: Option<Vec<String>>,
}

impl TerminalSettings {
    /// Default dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.rows, self.cols)
    }

    /// Parsed palette.
    pub fn palette(&self) -> crate::Result<Palette> {
        match &self.palette {
            Some(colors) => Palette::from_strings(colors),
            None => Ok(Palette::default()),
        }
    }
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            scrollback_lines: 10000,
            term: "xterm-256color".to_string(),
            font: "monospace 10".to_string(),
            font_scale: 1.0,
            palette: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.max_terminals, 10);
        assert_eq!(config.spawn.max_token, u32::MAX);
        assert!(config.spawn.search_path);
        assert_eq!(config.terminal.rows, 24);
        assert_eq!(config.terminal.cols, 80);
        assert!(config.spawn.default_timeout().is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_max_terminals() {
        let mut config = Config::default();
        config.general.max_terminals = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_token() {
        let mut config = Config::default();
        config.spawn.max_token = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = Config::default();
        config.terminal.rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_font_scale() {
        let mut config = Config::default();
        config.terminal.font_scale = f64::NAN;
        assert!(config.validate().is_err());
        config.terminal.font_scale = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
general:
  log_level: debug
  max_terminals: 4

spawn:
  max_token: 255
  default_timeout_ms: 1500
  search_path: false
  inherit_env: false
  correlator_scope: per_terminal
  env:
    LANG: C.UTF-8

terminal:
  rows: 30
  cols: 120
  scrollback_lines: 500
  font: "monospace 8"
  font_scale: 1.25
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.max_terminals, 4);
        assert_eq!(config.spawn.max_token, 255);
        assert_eq!(
            config.spawn.default_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert!(!config.spawn.search_path);
        assert_eq!(config.spawn.correlator_scope, CorrelatorScope::PerTerminal);
        assert_eq!(config.spawn.env.get("LANG").map(String::as_str), Some("C.UTF-8"));
        assert_eq!(config.terminal.dimensions(), Dimensions::new(30, 120));
        assert_eq!(config.terminal.scrollback_lines, 500);
    }

    #[test]
    fn test_palette_must_have_sixteen_entries() {
        let yaml = r##"
terminal:
  palette: ["#000000", "#FFFFFF"]
"##;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("terminal.palette"));
    }

    #[test]
    fn test_unknown_scope_is_rejected() {
        let yaml = "spawn:\n  correlator_scope: global\n";
        assert!(matches!(Config::from_yaml(yaml), Err(Error::Config(_))));
    }
}
