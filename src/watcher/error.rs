//! Error types for the watch engine.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watcher not activated within {timeout:?} for {path}")]
    ActivationTimeout { path: PathBuf, timeout: Duration },

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Watch queue closed")]
    QueueClosed,

    #[error("Watch queue interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("Watcher is stopped")]
    Stopped,

    #[error("Watcher already started")]
    AlreadyStarted,

    #[error("Subscription path is empty")]
    EmptyPath,

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Failed to load config: {reason}")]
    Config { reason: String },
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WatchError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

impl From<Box<figment::Error>> for WatchError {
    fn from(e: Box<figment::Error>) -> Self {
        WatchError::Config {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
