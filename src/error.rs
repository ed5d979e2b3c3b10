//! Error taxonomy for the ingestion pipeline
//!
//! Per-line conditions (a line with no record, a rich-text fallback) never show up
//! here: they are handled where they are detected. Everything in [`IngestError`]
//! ends the run.

use crate::models::EntityKind;
use thiserror::Error;

/// Errors raised while reading the dump file
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed after line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot seek to byte {offset}: file is only {total} bytes")]
    SeekPastEnd { offset: u64, total: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning an attribute map into a typed record
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("unknown entity kind `{0}` for the active schema")]
    UnknownKind(String),

    #[error("record has no primary key (Id)")]
    MissingKey,

    #[error("invalid value for {field}: `{value}` is not an integer")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kind {0} has no table in the active schema")]
    NoTable(EntityKind),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while saving or loading a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint does not match this run: {0}")]
    Mismatch(String),
}

/// Fatal, run-level failures
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("persistence fault at line {line}: {message}")]
    Persistence { line: u64, message: String },

    #[error("stream fault: {0}")]
    Stream(#[from] StreamError),

    #[error("checkpoint fault: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl IngestError {
    pub fn persistence(line: u64, err: impl std::fmt::Display) -> Self {
        IngestError::Persistence {
            line,
            message: err.to_string(),
        }
    }
}
