//! Delivery relay
//!
//! Front-door side: consumes answers from the response queue and sends each
//! one to its chat.

use std::sync::Arc;

use pocket_broker::QueueBroker;
use pocket_types::{Message, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::front_door::FrontDoor;
use crate::pool::{dispatch, TaskPool};

pub struct DeliveryRelay {
    consumer: Arc<dyn QueueBroker>,
    front_door: Arc<dyn FrontDoor>,
    settings: Arc<Settings>,
    queue: String,
}

impl DeliveryRelay {
    pub fn new(
        consumer: Arc<dyn QueueBroker>,
        front_door: Arc<dyn FrontDoor>,
        settings: Arc<Settings>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            consumer,
            front_door,
            settings,
            queue: queue.into(),
        }
    }

    /// Consume the response queue until cancelled or the subscription ends
    pub async fn run(self: Arc<Self>, pool: TaskPool, cancel: CancellationToken) -> Result<()> {
        let options = self.settings.consumer_config()?;
        let subscription = self.consumer.consume(&self.queue, &options).await?;
        info!(queue = %self.queue, "Delivery relay started");

        let relay = Arc::clone(&self);
        dispatch(subscription, &pool, &cancel, move |msg| {
            let relay = Arc::clone(&relay);
            async move { relay.deliver(msg).await }
        })
        .await;

        info!(queue = %self.queue, "Delivery relay stopped");
        Ok(())
    }

    /// Send one answer to its chat; failures are logged and the answer is lost
    pub async fn deliver(&self, msg: Message) {
        if msg.is_empty() {
            debug!(chat_id = %msg.chat_id, "Skipping empty answer");
            return;
        }

        match self.front_door.send(msg.chat_id, &msg.text).await {
            Ok(()) => debug!(chat_id = %msg.chat_id, "Answer delivered"),
            Err(e) => error!(
                chat_id = %msg.chat_id,
                error = %e,
                "Unable to send a message to the front door"
            ),
        }
    }
}
