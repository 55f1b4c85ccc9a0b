//! Configuration management for ipyvim.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.ipyvim/config.toml`
//! - Defaults for prompts, prompt colors, run flags and kernel lookup
//!
//! # Configuration File
//!
//! ```toml
//! [prompt]
//! input = "In [%(line)d]: "
//! output = "Out[%(line)d]: "
//!
//! [colors]
//! in_console = "Green"
//! out_gui = "Red"
//!
//! [buffer]
//! blank_lines = 1
//!
//! [run]
//! flags = "-i"
//! show_execution_count = true
//! monitor_output = true
//! reply_timeout_ms = 1000
//!
//! [kernel]
//! connect_timeout_ms = 5000
//! last_kernel_record = "~/.cpyvke/LastKernel"
//! ```
//!
//! Prompt, color and blank-line values can also be overridden per Vim
//! session through `g:ipy_status_*` variables; see [`crate::render`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Prompt templates
    pub prompt: PromptConfig,
    /// Prompt highlight colors
    pub colors: ColorConfig,
    /// Scratch buffer settings
    pub buffer: BufferConfig,
    /// Submission settings
    pub run: RunConfig,
    /// Kernel connection settings
    pub kernel: KernelConfig,
}

/// Prompt templates, `%(line)d` is replaced by the execution count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub input: String,
    pub output: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            input: "In [%(line)d]: ".to_string(),
            output: "Out[%(line)d]: ".to_string(),
        }
    }
}

/// Prompt colors as Vim color names, for the console and the GUI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    pub in_console: String,
    pub in_gui: String,
    pub out_console: String,
    pub out_gui: String,
    pub continuation_console: String,
    pub continuation_gui: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            in_console: "Green".to_string(),
            in_gui: "Green".to_string(),
            out_console: "Red".to_string(),
            out_gui: "Red".to_string(),
            continuation_console: "Gray".to_string(),
            continuation_gui: "Gray".to_string(),
        }
    }
}

/// Scratch buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// Buffer name shown in the preview window
    pub name: String,
    /// Keep a blank line at the end of the buffer (0 disables)
    pub blank_lines: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            name: "ipyvim-output".to_string(),
            blank_lines: 1,
        }
    }
}

/// Submission configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Flags passed to `%run` when sending a whole file
    pub flags: String,
    /// Wait for the shell reply to report `In[n]`
    pub show_execution_count: bool,
    /// Refresh the scratch buffer after every submission
    pub monitor_output: bool,
    /// Upper bound on the shell reply wait
    pub reply_timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            flags: "-i".to_string(),
            show_execution_count: true,
            monitor_output: true,
            reply_timeout_ms: 1000,
        }
    }
}

impl RunConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Kernel connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Upper bound on opening the kernel's sockets
    pub connect_timeout_ms: u64,
    /// Record of the last kernel started by cpyvke
    pub last_kernel_record: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            last_kernel_record: "~/.cpyvke/LastKernel".to_string(),
        }
    }
}

impl KernelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Last-kernel record path with `~` expanded
    pub fn last_kernel_record_path(&self) -> PathBuf {
        expand_home(&self.last_kernel_record)
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write configuration to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(path, self.to_toml()?).map_err(write_error)
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        app_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.ipyvim`, home of the config file and the log
pub fn app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ipyvim"))
}

/// Expand a leading `~/`
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
