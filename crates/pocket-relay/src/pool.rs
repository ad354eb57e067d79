//! Bounded fan-out for per-message work
//!
//! Every relay hands each message to its own task. The pool caps how many of
//! those run at once; a loop holding a message waits for a permit before
//! pulling another, so excess load stays buffered in the intermediary.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pocket_broker::Subscription;
use pocket_types::Message;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Semaphore-bounded task pool with shutdown draining
#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    limit: usize,
}

impl TaskPool {
    /// Create a pool allowing `limit` tasks at once
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            tracker: TaskTracker::new(),
            limit,
        }
    }

    /// Wait for room for one more task, `None` once the pool is shut down
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }

    /// Run a task holding a previously acquired permit
    pub fn spawn_with<F>(&self, permit: OwnedSemaphorePermit, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            task.await;
            drop(permit);
        });
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Stop handing out permits and wait for running tasks
    ///
    /// Returns `false` if tasks were still running when `grace` elapsed.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.permits.close();
        self.tracker.close();

        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight work");
        }

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "In-flight work still running after grace period"
                );
                false
            }
        }
    }
}

/// Feed every message of a subscription to `handle`, one task per message
///
/// A permit is taken only once a message is in hand, so an idle loop holds
/// no share of the pool. While the pool is saturated the loop stops pulling
/// and deliveries back up into the intermediary.
///
/// Returns when the subscription ends, the pool shuts down or `cancel` fires.
pub(crate) async fn dispatch<F, Fut>(
    mut subscription: Subscription,
    pool: &TaskPool,
    cancel: &CancellationToken,
    handle: F,
) where
    F: Fn(Message) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = subscription.next() => match msg {
                Some(msg) => msg,
                None => {
                    warn!(queue = %subscription.queue(), "Subscription ended");
                    break;
                }
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(chat_id = %msg.chat_id, "Dropping message taken before shutdown");
                break;
            }
            permit = pool.acquire() => match permit {
                Some(permit) => permit,
                None => break,
            },
        };

        pool.spawn_with(permit, handle(msg));
    }

    subscription.cancel();
    debug!(queue = %subscription.queue(), "Dispatch loop stopped");
}
