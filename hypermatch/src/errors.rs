/// Error types for hypermatch.
///
/// Every failure the engines can produce is a variant of [`MatchError`] and is
/// returned as a value, never raised as a panic:
///
/// ```rust,ignore
/// match engine.match_strings(&["corpus"]) {
///     Ok(expressions) => // Use matched expressions,
///     Err(MatchError::Busy) => // Every worker is scanning, try again later,
///     Err(MatchError::Unloaded) => // Call update() first,
///     Err(e) => // Handle other errors
/// }
/// ```
///
/// Lifecycle and precondition errors (`NoPatterns`, `NotRunning`,
/// `AlreadyStarted`, `Unloaded`, `Busy`) are decided at the start of a call
/// and leave engine state untouched. Compile and build errors abort an update
/// before anything shared is replaced, so the previous database keeps serving.
use thiserror::Error;

use crate::matcher::{DatabaseError, PatternError, ScanError, ScratchError};

/// Result type for engine operations
pub type MatchResult<T> = Result<T, MatchError>;

/// Errors that can occur while updating or matching
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no patterns specified")]
    NoPatterns,
    #[error("workers not started")]
    NotRunning,
    #[error("workers already started")]
    AlreadyStarted,
    #[error("database not loaded")]
    Unloaded,
    #[error("workers busy")]
    Busy,
    #[error("invalid pattern {expression}: {cause}")]
    Parse {
        expression: String,
        #[source]
        cause: PatternError,
    },
    #[error("error building pattern database: {cause}")]
    Build {
        #[source]
        cause: DatabaseError,
    },
    #[error("worker uninitialized")]
    WorkerUninitialized,
    #[error("worker scratch unavailable: {cause}")]
    Scratch {
        #[source]
        cause: ScratchError,
    },
    #[error("scan failed: {cause}")]
    Scan {
        #[source]
        cause: ScanError,
    },
    #[error("worker exited before replying")]
    Disconnected,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatchError {
    pub fn parse_error(expression: impl Into<String>, cause: PatternError) -> Self {
        Self::Parse {
            expression: expression.into(),
            cause,
        }
    }

    pub fn build_error(cause: DatabaseError) -> Self {
        Self::Build { cause }
    }

    pub fn scratch_error(cause: ScratchError) -> Self {
        Self::Scratch { cause }
    }

    pub fn scan_error(cause: ScanError) -> Self {
        Self::Scan { cause }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is the transient "no idle worker" signal
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl From<config::ConfigError> for MatchError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
