//! Common error types for rockola
//!
//! Defines the shared error taxonomy using thiserror for clear error
//! propagation across the device, store, and coordination layers.

use thiserror::Error;

/// Common result type for rockola operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the rockola services
#[derive(Error, Debug)]
pub enum Error {
    /// Playback device could not be initialized (missing credentials,
    /// rejected connection, restricted subscription tier). Fatal to
    /// playback for this session; queue state is unaffected.
    #[error("Device initialization failed: {0}")]
    DeviceInit(String),

    /// Playback device did not become ready within the bounded wait.
    /// Retryable by re-initialization.
    #[error("Device timed out: {0}")]
    DeviceTimeout(String),

    /// Queue mutation failed at the persistence layer. Callers must
    /// reload authoritative state rather than retrying blindly.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Mutation target is no longer valid (e.g. promoting an item that
    /// another session already resolved). Reload and ignore.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operate-on-missing-item. Treat as already resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP collaborator error (credentials endpoint, fan-out relay)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid user input or request parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
