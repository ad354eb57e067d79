//! Front-door listener
//!
//! Polls the front door and hands every inbound event to the request relay
//! on its own task.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::front_door::FrontDoor;
use crate::pool::TaskPool;
use crate::request::RequestRelay;

/// Pause after a failed poll before trying again
const POLL_BACKOFF: Duration = Duration::from_secs(3);

pub struct Listener {
    front_door: Arc<dyn FrontDoor>,
    relay: Arc<RequestRelay>,
    pool: TaskPool,
    backoff: Duration,
}

impl Listener {
    pub fn new(front_door: Arc<dyn FrontDoor>, relay: Arc<RequestRelay>, pool: TaskPool) -> Self {
        Self {
            front_door,
            relay,
            pool,
            backoff: POLL_BACKOFF,
        }
    }

    /// Override the pause after a failed poll
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Poll until cancelled or the pool shuts down
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Listening to the front door");

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                updates = self.front_door.next_updates() => updates,
            };

            let events = match updates {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "Unable to poll the front door");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => continue,
                    }
                }
            };

            for event in events {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = self.pool.acquire() => match permit {
                        Some(permit) => permit,
                        None => return,
                    },
                };

                let relay = Arc::clone(&self.relay);
                self.pool.spawn_with(permit, async move {
                    if let Err(e) = relay.handle(&event).await {
                        error!(
                            message_id = event.message_id,
                            error = %e,
                            "Unable to handle update"
                        );
                    }
                });
            }
        }

        info!("Front door listener stopped");
    }
}
