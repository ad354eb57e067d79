//! Queue broker trait definition
//!
//! Defines the interface every intermediary backend implements.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pocket_types::{ConsumerConfig, Queue, Result};

use crate::subscription::Subscription;

/// One connection plus one logical channel to the intermediary
///
/// Connecting is backend specific and happens in each backend's constructor.
/// A broker is owned by a single process role (producing or consuming) and is
/// closed exactly once.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Declare a queue, or attach to it if it already exists
    ///
    /// Must be called before the queue is published to or consumed from on
    /// this connection. Declaring the same name again succeeds.
    async fn declare_queue(&self, name: &str) -> Result<Queue>;

    /// Hand a payload to the intermediary
    ///
    /// Success means the intermediary accepted the bytes, not that anyone
    /// will read them. Fails with `QueueNotDeclared` for unknown queues and
    /// `PublishTimeout` when `timeout` elapses first.
    async fn publish(&self, queue: &str, payload: Bytes, timeout: Duration) -> Result<()>;

    /// Open a subscription on a declared queue
    ///
    /// Payloads that do not decode as a message are logged and dropped.
    async fn consume(&self, queue: &str, config: &ConsumerConfig) -> Result<Subscription>;

    /// Close the channel, then the connection
    ///
    /// Failures are logged, never returned. Open subscriptions end.
    async fn close(&self);
}
