//! Request relay
//!
//! Front-door side: acknowledges the user and queues the prompt for the
//! solver service.

use std::sync::Arc;
use std::time::Duration;

use pocket_broker::QueueBroker;
use pocket_types::{Error, Result};
use tracing::{debug, error, info, instrument};

use crate::front_door::{FrontDoor, InboundEvent};
use crate::notices;

/// Moves inbound events onto the request queue
pub struct RequestRelay {
    producer: Arc<dyn QueueBroker>,
    front_door: Arc<dyn FrontDoor>,
    queue: String,
    publish_timeout: Duration,
}

impl RequestRelay {
    pub fn new(
        producer: Arc<dyn QueueBroker>,
        front_door: Arc<dyn FrontDoor>,
        queue: impl Into<String>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            front_door,
            queue: queue.into(),
            publish_timeout,
        }
    }

    /// Handle one inbound event
    ///
    /// On a failed publish the user gets the failure notice and the error is
    /// returned; nothing is retried.
    #[instrument(name = "request_relay", skip_all, fields(chat_id = %event.chat_id()))]
    pub async fn handle(&self, event: &InboundEvent) -> Result<()> {
        if event.is_command {
            debug!(text = %event.text, "Commands are not handled yet");
            return Ok(());
        }
        if event.text.is_empty() {
            debug!("Ignoring event without text");
            return Ok(());
        }

        let chat_id = event.chat_id();

        if let Err(e) = self.front_door.send(chat_id, notices::PLEASE_WAIT).await {
            error!(error = %e, "Unable to send a message to the front door");
        }

        let payload = event.to_bytes().map_err(|e| {
            error!(error = %e, "Unable to convert into json");
            Error::Serialization(e)
        })?;

        if let Err(e) = self
            .producer
            .publish(&self.queue, payload, self.publish_timeout)
            .await
        {
            error!(queue = %self.queue, error = %e, "Unable to publish message to the solver service");

            if let Err(send_err) = self
                .front_door
                .send(chat_id, notices::SERVICE_UNAVAILABLE)
                .await
            {
                error!(error = %send_err, "Unable to send a message to the front door");
            }
            return Err(e);
        }

        info!(queue = %self.queue, "Prompt queued");
        Ok(())
    }
}
