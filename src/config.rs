//! Kernel configuration, persisted as TOML.
//!
//! The constraint policy travels inside the config and is handed to the
//! kernel fresh on every call.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraints::ConstraintPolicy;
use crate::scheduler::DEFAULT_HORIZON_DAYS;

/// Errors from loading or saving a kernel config.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read kernel config: {path}")]
    #[diagnostic(
        code(jericho::config::read),
        help("Ensure the config file exists. `jericho config init` writes a default one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse kernel config: {path}")]
    #[diagnostic(
        code(jericho::config::parse),
        help("Check the TOML syntax: {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to serialize kernel config: {message}")]
    #[diagnostic(code(jericho::config::serialize))]
    Serialize { message: String },

    #[error("failed to write kernel config: {path}")]
    #[diagnostic(
        code(jericho::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings every kernel call reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Days the auto-scheduler plans ahead.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Per-deliverable deficit a cycle may carry and still converge.
    #[serde(default)]
    pub convergence_tolerance: u32,
    #[serde(default)]
    pub constraints: ConstraintPolicy,
}

fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            convergence_tolerance: 0,
            constraints: ConstraintPolicy::default(),
        }
    }
}

impl KernelConfig {
    /// Config with `constraints` and every other field defaulted.
    pub fn with_constraints(constraints: ConstraintPolicy) -> Self {
        Self {
            constraints,
            ..Default::default()
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
