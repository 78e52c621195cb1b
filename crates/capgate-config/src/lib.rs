#![warn(missing_docs)]

//! # capgate-config
//!
//! Configuration loading for capgate.
//!
//! Supports an optional TOML file with environment variable expansion.
//! Every field is optional; command-line flags override whatever is set here.
//!
//! ## Example
//!
//! ```toml
//! [catalog]
//! path = "capabilities/functions.py"
//!
//! [scanner]
//! extra_builtins = ["min", "max", "sum"]
//! reject_indirection = true
//!
//! [engine]
//! command = "${HOME}/.local/bin/capgate-engine"
//! timeout_secs = 10
//!
//! [bootstrap]
//! program = "uv"
//! args = ["run", "--quiet"]
//! ```

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use thiserror::Error;

/// Default catalog path, relative to the working directory.
pub const DEFAULT_CATALOG_PATH: &str = "functions.py";

/// Default advisory execution timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest accepted execution timeout in seconds (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Largest accepted IPC message size in megabytes.
pub const MAX_IPC_MESSAGE_SIZE_MB: usize = 1024;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level capgate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateConfig {
    /// Capability catalog settings.
    #[serde(default)]
    pub catalog: CatalogOverrides,

    /// Static reference scanner settings.
    #[serde(default)]
    pub scanner: ScannerOverrides,

    /// External sandbox engine settings.
    #[serde(default)]
    pub engine: EngineOverrides,

    /// Dependency bootstrap settings.
    #[serde(default)]
    pub bootstrap: BootstrapOverrides,
}

/// Capability catalog overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogOverrides {
    /// Catalog source path used when `--functions` is not given.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Scanner overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScannerOverrides {
    /// Replaces the default builtin exclusion set entirely.
    #[serde(default)]
    pub builtins: Option<Vec<String>>,

    /// Names added on top of the (default or replaced) exclusion set.
    #[serde(default)]
    pub extra_builtins: Vec<String>,

    /// Reject snippets that use indirect invocation instead of warning.
    #[serde(default)]
    pub reject_indirection: bool,
}

/// Engine overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineOverrides {
    /// Engine command. When absent the engine binary is discovered.
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments for the engine command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Execution timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Script identifier handed to the engine.
    #[serde(default)]
    pub script_name: Option<String>,

    /// Maximum IPC message size in megabytes.
    #[serde(default)]
    pub max_ipc_message_size_mb: Option<usize>,

    /// Extra time granted past the timeout before the local watchdog fires.
    #[serde(default)]
    pub watchdog_grace_ms: Option<u64>,

    /// Additional environment variable names forwarded to the engine.
    #[serde(default)]
    pub pass_env: Vec<String>,
}

/// Bootstrap overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapOverrides {
    /// Set to `false` to never relaunch, even when dependencies are declared.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Provisioner program (default `uv`).
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments placed before the per-package flags (default `["run"]`).
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Flag repeated once per package (default `--with`).
    #[serde(default)]
    pub with_flag: Option<String>,
}

impl GateConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    /// Catalog path from config, or the built-in default.
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH))
    }

    /// Timeout from config, or the built-in default.
    pub fn timeout_secs(&self) -> u64 {
        self.engine.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Whether the dependency bootstrap may relaunch the process.
    pub fn bootstrap_enabled(&self) -> bool {
        self.bootstrap.enabled.unwrap_or(true)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.engine.timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "engine.timeout_secs must be greater than zero".into(),
                ));
            }
            Some(secs) if secs > MAX_TIMEOUT_SECS => {
                return Err(ConfigError::Invalid(format!(
                    "engine.timeout_secs must be at most {MAX_TIMEOUT_SECS}, got {secs}"
                )));
            }
            _ => {}
        }

        match self.engine.max_ipc_message_size_mb {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "engine.max_ipc_message_size_mb must be greater than zero".into(),
                ));
            }
            Some(mb) if mb > MAX_IPC_MESSAGE_SIZE_MB => {
                return Err(ConfigError::Invalid(format!(
                    "engine.max_ipc_message_size_mb must be at most {MAX_IPC_MESSAGE_SIZE_MB}, got {mb}"
                )));
            }
            _ => {}
        }

        if let Some(command) = &self.engine.command {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("engine.command is empty".into()));
            }
        }

        if self.bootstrap_enabled() {
            if matches!(&self.bootstrap.program, Some(p) if p.trim().is_empty()) {
                return Err(ConfigError::Invalid("bootstrap.program is empty".into()));
            }
            if matches!(&self.bootstrap.with_flag, Some(f) if f.trim().is_empty()) {
                return Err(ConfigError::Invalid("bootstrap.with_flag is empty".into()));
            }
        }

        let names = self
            .scanner
            .builtins
            .iter()
            .flatten()
            .chain(self.scanner.extra_builtins.iter());
        for name in names {
            if !is_identifier(name) {
                return Err(ConfigError::Invalid(format!(
                    "scanner builtin '{}' is not a valid identifier",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Locate the config file.
///
/// Search order:
/// 1. `CAPGATE_CONFIG` environment variable
/// 2. `./capgate.toml` in the current directory
/// 3. None (no config file found — not an error)
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CAPGATE_CONFIG") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let cwd = PathBuf::from("capgate.toml");
    if cwd.exists() {
        return Some(cwd);
    }

    None
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `${NAME}` placeholders. Anything else containing `$` is left alone.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Substitute `${NAME}` from the environment, keeping unset ones verbatim.
fn expand_env_vars(input: &str) -> Cow<'_, str> {
    PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
}
