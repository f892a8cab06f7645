//! Error types for mattervote.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Poll error: {0}")]
    Poll(#[from] PollError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage-related errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Storage operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Poll lifecycle errors.
///
/// Structured kinds the dispatcher downgrades into user-facing text.
/// Nothing below the dispatcher writes to the chat channel.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Poll {id} not found")]
    NotFound { id: String },

    #[error("Poll {id} is closed")]
    Closed { id: String },

    #[error("Poll {id} is already closed")]
    AlreadyClosed { id: String },

    #[error("User {user_id} is not the creator of poll {id}")]
    Forbidden { id: String, user_id: String },

    #[error("Option \"{option}\" does not exist in poll {id}")]
    InvalidOption { id: String, option: String },

    #[error("Poll question must not be empty")]
    EmptyQuestion,

    #[error("Poll must have at least one option")]
    NoOptions,

    #[error("Option \"{option}\" appears more than once")]
    DuplicateOption { option: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
