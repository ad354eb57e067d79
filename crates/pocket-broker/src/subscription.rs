//! Cancellable consumer subscription

use pocket_types::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Deliveries buffered between the backend reader and the relay
pub const HANDOFF_CAPACITY: usize = 64;

/// Stream of decoded messages from one queue
///
/// Ends when cancelled, when the owning broker is closed or when the
/// intermediary stops delivering. Dropping the subscription cancels it.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    receiver: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Build a subscription over a hand-off channel fed by a backend task
    pub fn new(
        queue: impl Into<String>,
        receiver: mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: queue.into(),
            receiver,
            cancel,
        }
    }

    /// Name of the subscribed queue
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Wait for the next message, `None` once the subscription has ended
    pub async fn next(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            msg = self.receiver.recv() => msg,
        }
    }

    /// Stop the subscription
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this subscription when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the subscription has been stopped
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Decode a raw delivery, logging and dropping malformed payloads
pub(crate) fn decode_delivery(queue: &str, payload: &[u8]) -> Option<Message> {
    match Message::from_slice(payload) {
        Ok(msg) => {
            debug!(queue = %queue, chat_id = %msg.chat_id, "Message delivered");
            Some(msg)
        }
        Err(e) => {
            error!(
                queue = %queue,
                error = %e,
                size = payload.len(),
                "Unable to decode delivery, dropping it"
            );
            None
        }
    }
}
