//! Error types shared across the player.
//!
//! `PlaybackError` is what session operations return; the session also
//! records a compact `ErrorKind` in its observable state so the UI can show
//! the failure and offer a retry.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("could not open {}: {reason}", locator.display())]
    LoadFailed { locator: PathBuf, reason: String },

    #[error("playback was denied: {0}")]
    PlaybackDenied(String),

    #[error("audio visualization is not supported: {0}")]
    VisualizationUnsupported(String),

    #[error("no track is loaded")]
    NotLoaded,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{}: unsupported file type {mime}", path.display())]
    UnsupportedType { path: PathBuf, mime: String },

    #[error("{}: file too large ({size} bytes, limit {limit})", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("{}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json under key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("no data directory for the log file")]
    NoDataDir,

    #[error("cannot open log file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a logger is already installed")]
    Install(#[from] log::SetLoggerError),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown option {0}")]
    UnknownOption(String),

    #[error("{0} needs a file argument")]
    MissingValue(&'static str),

    #[error("unexpected argument {0} after {1}")]
    Unexpected(String, &'static str),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: not a library export: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage could not complete {0}")]
    Storage(&'static str),
}
