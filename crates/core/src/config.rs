//! Configuration for tether, loaded from a TOML file.
//!
//! ```toml
//! [[mapping]]
//! local = "/home/me/src"
//! remote = "work"
//!
//! [agent]
//! command = "tether-agent"
//! args = ["--root", "/data"]
//!
//! [sync]
//! debounce_ms = 200
//! skip = """
//! target/
//! *.tmp
//! """
//! ```
//!
//! Every section has serde defaults so a minimal config only needs the
//! mapping entries.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::{MapEntry, Mapping, MappingError};

/// One `[[mapping]]` table in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
  /// Absolute local root to replicate.
  pub local: PathBuf,
  /// Relative destination root on the agent side.
  pub remote: String,
}

/// How to launch the remote agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
  /// Executable to spawn; requests go to its stdin, responses come from
  /// its stdout, and its stderr is forwarded to the log.
  #[serde(default = "default_agent_command")]
  pub command: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      command: default_agent_command(),
      args: Vec::new(),
    }
  }
}

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
  /// Quiet period required before a burst of filesystem events is handled.
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
  /// Flicker-suppression window for the status icon.
  #[serde(default = "default_status_debounce_ms")]
  pub status_debounce_ms: u64,
  /// Ignore rules, one gitignore-dialect pattern per line. `.git/` is
  /// always excluded in addition to these.
  #[serde(default)]
  pub skip: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
      status_debounce_ms: default_status_debounce_ms(),
      skip: String::new(),
    }
  }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default, rename = "mapping")]
  pub mappings: Vec<MappingConfig>,
  #[serde(default)]
  pub agent: AgentConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error(transparent)]
  Mapping(#[from] MappingError),
}

impl Config {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(toml::from_str(&text)?)
  }

  /// Build the validated [`Mapping`] from the configured entries.
  pub fn mapping(&self) -> Result<Mapping, MappingError> {
    Mapping::new(
      self
        .mappings
        .iter()
        .map(|m| MapEntry {
          local_root: m.local.clone(),
          remote_root: m.remote.clone(),
        })
        .collect(),
    )
  }
}

fn default_agent_command() -> String {
  "tether-agent".to_string()
}

fn default_debounce_ms() -> u64 {
  200
}

fn default_status_debounce_ms() -> u64 {
  100
}
