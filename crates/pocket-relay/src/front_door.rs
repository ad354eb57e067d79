//! Front Door interface
//!
//! The chat transport end users talk to. The relays only need to poll it for
//! inbound events and send text back to a chat.

use async_trait::async_trait;
use bytes::Bytes;
use pocket_types::ChatId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a front-door transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never got a response
    #[error("HTTP error: {0}")]
    Http(String),

    /// The platform answered with an error
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },

    /// The response body could not be understood
    #[error("Unable to decode response: {0}")]
    Decode(String),
}

/// Chat an inbound event came from
///
/// Travels as `from` on the wire; `id` is the chat the answer goes back to,
/// not the author's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

/// A message a user sent to the front door
///
/// This is what travels on the request queue, serialized as-is; the far
/// side reads `text` and `from.id` out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: i64,
    pub from: ChatRef,
    /// Handle of the author, when the platform reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: i64,
    /// Text starts with a bot command such as `/start`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_command: bool,
}

impl InboundEvent {
    /// Plain text event, used by adapters and tests
    pub fn text(message_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            message_id,
            from: ChatRef { id: chat_id },
            username: None,
            text: text.into(),
            date: 0,
            is_command: false,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        ChatId(self.from.id)
    }

    /// Queue payload for this event
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// The chat transport
#[async_trait]
pub trait FrontDoor: Send + Sync {
    /// Wait for the next batch of inbound events
    ///
    /// Implementations long-poll; an empty batch is a normal result.
    async fn next_updates(&self) -> Result<Vec<InboundEvent>, TransportError>;

    /// Send text to a chat
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}
