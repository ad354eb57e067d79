//! Telegram front door
//!
//! Long-polls the Bot API for updates and sends plain text replies.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pocket_relay::{ChatRef, FrontDoor, InboundEvent, TransportError};
use pocket_types::ChatId;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Seconds Telegram may hold a getUpdates call open
const LONG_POLL_SECS: u64 = 60;

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    #[serde(default)]
    date: i64,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(rename = "type")]
    kind: String,
    offset: i64,
}

/// A Telegram account
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TgMessage {
    fn is_command(&self) -> bool {
        self.entities
            .first()
            .is_some_and(|e| e.kind == "bot_command" && e.offset == 0)
    }

    fn into_event(self) -> InboundEvent {
        let is_command = self.is_command();
        InboundEvent {
            message_id: self.message_id,
            from: ChatRef { id: self.chat.id },
            username: self.from.and_then(|u| u.username),
            text: self.text.unwrap_or_default(),
            date: self.date,
            is_command,
        }
    }
}

pub struct TelegramFrontDoor {
    client: Client,
    base: String,
    offset: AtomicI64,
    poll_secs: u64,
}

impl TelegramFrontDoor {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            offset: AtomicI64::new(0),
            poll_secs: LONG_POLL_SECS,
        })
    }

    /// Shorten the long poll
    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_secs = secs;
        self
    }

    /// Check the token by asking who we are
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call(self.client.get(self.url("getMe"))).await
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.without_url().to_string()))?;

        if !body.ok {
            return Err(TransportError::Api {
                code: body.error_code.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
            });
        }
        body.result
            .ok_or_else(|| TransportError::Decode("response has no result".to_string()))
    }
}

#[async_trait]
impl FrontDoor for TelegramFrontDoor {
    async fn next_updates(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let offset = self.offset.load(Ordering::SeqCst);
        let request = self
            .client
            .get(self.url("getUpdates"))
            .query(&[("offset", offset), ("timeout", self.poll_secs as i64)]);

        let updates: Vec<Update> = self.call(request).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        let events: Vec<InboundEvent> = updates
            .into_iter()
            .filter_map(|u| u.message)
            .map(TgMessage::into_event)
            .collect();
        debug!(count = events.len(), "Received updates");
        Ok(events)
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        let request = self.client.post(self.url("sendMessage")).json(&SendMessage {
            chat_id: chat_id.0,
            text,
        });
        let _sent: serde_json::Value = self.call(request).await?;
        Ok(())
    }
}
