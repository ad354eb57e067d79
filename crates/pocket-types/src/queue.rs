//! Queue types for the relay
//!
//! Defines queue metadata, the fixed declaration properties and the consumer
//! options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the queue carrying prompts towards the solver
pub const REQUEST_QUEUE: &str = "aiRequest";

/// Name of the queue carrying answers back to the front door
pub const RESPONSE_QUEUE: &str = "Response";

/// Properties every queue is declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueProperties {
    /// Survive a broker restart
    pub durable: bool,
    /// Delete when the last consumer goes away
    pub auto_delete: bool,
    /// Restrict to the declaring connection
    pub exclusive: bool,
    /// Do not wait for the declare confirmation
    pub no_wait: bool,
}

impl Default for QueueProperties {
    fn default() -> Self {
        Self {
            durable: false,
            auto_delete: false,
            exclusive: false,
            no_wait: false,
        }
    }
}

/// A queue declared on a broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    /// Queue name (unique per connection)
    pub name: String,

    /// Declaration properties
    pub properties: QueueProperties,

    /// When the queue was declared on this connection
    pub declared_at: DateTime<Utc>,
}

impl Queue {
    /// Create a queue with the default properties
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: QueueProperties::default(),
            declared_at: Utc::now(),
        }
    }
}

/// Options for opening a consumer subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Server treats deliveries as acknowledged as soon as they are sent
    pub auto_ack: bool,
    /// Only this consumer may read the queue
    pub exclusive: bool,
    /// Do not deliver messages published on this connection
    pub no_local: bool,
    /// Do not wait for the consume confirmation
    pub no_wait: bool,
    /// Consumer tag; empty lets the server pick one
    pub consumer_tag: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            auto_ack: true,
            exclusive: false,
            no_local: false,
            no_wait: false,
            consumer_tag: String::new(),
        }
    }
}

/// Parse a boolean the way the configuration file spells them
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
