//! Rich diagnostic error types for jericho.
//!
//! The kernel itself never fails: domain refusals travel as denials inside
//! the snapshot. These errors cover everything around it, from parsing
//! time values to reading snapshots and configs from disk.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::time::TimeError;

/// Top-level error type for jericho.
#[derive(Debug, Error, Diagnostic)]
pub enum JerichoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("failed to read {what}: {path}")]
    #[diagnostic(
        code(jericho::persist::read),
        help("Check that {path} exists and is readable.")
    )]
    Read {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {what}: {path}")]
    #[diagnostic(
        code(jericho::persist::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        what: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what} in {path}")]
    #[diagnostic(
        code(jericho::persist::json),
        help("The file must hold valid JSON: {message}")
    )]
    Json {
        what: &'static str,
        path: String,
        message: String,
    },
}

/// Convenience alias for functions that return jericho errors.
pub type JerichoResult<T> = std::result::Result<T, JerichoError>;
