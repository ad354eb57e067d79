//! Pocket Broker - Intermediary backends for the relay
//!
//! This crate provides the [`QueueBroker`] abstraction and its backends:
//! - AMQP (RabbitMQ) through `lapin`
//! - In-memory, for development and testing

pub mod subscription;
pub mod traits;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "memory")]
pub mod memory;

// Re-exports
pub use subscription::Subscription;
pub use traits::QueueBroker;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;

#[cfg(feature = "memory")]
pub use memory::{MemoryBroker, MemoryServer};
