//! Error types for the relay
//!
//! Defines the error type shared by the broker backends and the relays.

use thiserror::Error;

/// Main error type for broker and relay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Could not reach or authenticate with the intermediary
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted on a broker that was already closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Queue was referenced before being declared on this connection
    #[error("Queue not declared: {0}")]
    QueueNotDeclared(String),

    /// Queue declaration rejected by the intermediary
    #[error("Unable to declare queue {queue}: {reason}")]
    Declaration { queue: String, reason: String },

    /// Publish rejected by the intermediary
    #[error("Unable to publish to {queue}: {reason}")]
    Publish { queue: String, reason: String },

    /// Publish did not complete before its deadline
    #[error("Publish to {0} timed out")]
    PublishTimeout(String),

    /// Subscription could not be opened
    #[error("Unable to consume from {queue}: {reason}")]
    Consume { queue: String, reason: String },

    /// Missing or malformed configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
