//! Message types for the relay
//!
//! A [`Message`] is the unit carried on both named queues. On the wire it is
//! `{"text": "...", "from": {"id": 42}}`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of the chat a message belongs to
///
/// This is the only correlation key between a request and its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A chat message in transit between the two services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message text (the prompt on the request queue, the answer on the response queue)
    #[serde(default)]
    pub text: String,

    /// Chat the message came from and the answer goes back to
    #[serde(rename = "from", with = "chat_ref")]
    pub chat_id: ChatId,
}

impl Message {
    /// Create a new message for the given chat
    pub fn new(chat_id: impl Into<ChatId>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Decode a message from a queue payload
    ///
    /// Fields other than `text` and `from.id` are ignored, so a raw front-door
    /// event decodes as well.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encode the message as a queue payload
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Replace the text in place, keeping the chat
    pub fn replace_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Whether there is anything to relay
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// `ChatId` travels as `{"id": <i64>}` under the `from` key
mod chat_ref {
    use super::ChatId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct ChatRef {
        id: i64,
    }

    pub fn serialize<S>(chat_id: &ChatId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ChatRef { id: chat_id.0 }.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ChatId, D::Error>
    where
        D: Deserializer<'de>,
    {
        ChatRef::deserialize(deserializer).map(|r| ChatId(r.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_wire_format() {
        let msg = Message::new(42, "Hello");
        let bytes = msg.to_bytes().unwrap();

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"text": "Hello", "from": {"id": 42}}));
    }

    #[test]
    fn test_reencode_preserves_payload() {
        let raw = br#"{"from":{"id":-1001234},"text":"Where is the museum?"}"#;

        let msg = Message::from_slice(raw).unwrap();
        let reencoded: Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        let original: Value = serde_json::from_slice(raw).unwrap();
        assert_eq!(reencoded, original);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let raw = json!({
            "message_id": 7,
            "text": "Hi",
            "from": {"id": 42, "username": "traveller"},
            "date": 1689200000
        });

        let msg = Message::from_slice(raw.to_string().as_bytes()).unwrap();
        assert_eq!(msg, Message::new(42, "Hi"));
    }

    #[test]
    fn test_missing_text_is_empty() {
        let msg = Message::from_slice(br#"{"from":{"id":5}}"#).unwrap();
        assert!(msg.is_empty());
        assert_eq!(msg.chat_id, ChatId(5));
    }

    #[test]
    fn test_malformed_payload_fails() {
        assert!(Message::from_slice(b"not json").is_err());
        assert!(Message::from_slice(br#"{"text":"no chat"}"#).is_err());
    }

    #[test]
    fn test_replace_text_keeps_chat() {
        let mut msg = Message::new(42, "question");
        msg.replace_text("answer");
        assert_eq!(msg.text, "answer");
        assert_eq!(msg.chat_id, ChatId(42));
    }
}
