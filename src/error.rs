use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the quad store.
///
/// Engine errors from the backing LMDB environment roll back any in-flight
/// write transaction before they reach the caller. Map-full conditions are
/// absorbed by the auto-grow path and never appear here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("storage engine error: {0}")]
    Engine(#[from] heed::Error),
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("incompatible store format: found version {found}, supported version {supported}")]
    FormatVersion { found: u32, supported: u32 },
    #[error("metadata file error: {0}")]
    Metadata(String),
    #[error("write pipeline terminated unexpectedly")]
    PipelineClosed,
}
