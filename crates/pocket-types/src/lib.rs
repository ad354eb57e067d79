//! Pocket Types - Core domain types for the relay
//!
//! This crate contains the types shared by the broker backends, the relays
//! and the service binaries.

pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{ChatId, Message};
pub use queue::{
    parse_bool, ConsumerConfig, Queue, QueueProperties, REQUEST_QUEUE, RESPONSE_QUEUE,
};
