// Centralized error types for the access controller

use thiserror::Error;

/// Errors raised while reading or validating configuration values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid card UID: {0}")]
    InvalidUid(String),

    #[error("Invalid user level: {0}")]
    InvalidUserLevel(u8),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by durable cache storage
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to access cache file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cache snapshot at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Snapshot has {actual} entries, store holds {expected}")]
    CapacityMismatch { expected: usize, actual: usize },
}

/// Errors raised by the backend transport
///
/// These never reach the authorization logic: the client turns them into
/// inconclusive responses.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend is offline")]
    Offline,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned error status: {0}")]
    Status(u16),

    #[error("Failed to parse backend reply: {0}")]
    Parse(#[from] serde_json::Error),
}
