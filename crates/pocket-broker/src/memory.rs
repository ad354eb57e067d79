//! In-memory broker backend
//!
//! Fast, non-persistent intermediary for development and testing.
//! A [`MemoryServer`] plays the role of the broker service; every
//! [`MemoryBroker`] is one connection to it. All data is lost when the
//! process exits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use pocket_types::{ConsumerConfig, Error, Queue, Result};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::subscription::{decode_delivery, Subscription, HANDOFF_CAPACITY};
use crate::traits::QueueBroker;

/// Internal queue data structure
struct QueueData {
    /// Queue metadata from the first declaration
    queue: Queue,
    /// Payloads waiting for a consumer
    messages: Mutex<VecDeque<Bytes>>,
    /// Wakes consumers waiting on an empty queue
    notify: Notify,
    /// Active consumers
    consumers: AtomicUsize,
    /// Whether the active consumer holds the queue exclusively
    exclusive: AtomicBool,
}

impl QueueData {
    fn new(queue: Queue) -> Self {
        Self {
            queue,
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            consumers: AtomicUsize::new(0),
            exclusive: AtomicBool::new(false),
        }
    }

    fn push(&self, payload: Bytes) {
        self.messages.lock().push_back(payload);
        self.notify.notify_waiters();
    }

    /// Wait until a payload is available and take it
    async fn pop_wait(&self) -> Bytes {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.messages.lock().pop_front() {
                return payload;
            }

            notified.await;
        }
    }

    fn attach(&self, exclusive: bool) -> bool {
        if self.exclusive.load(Ordering::SeqCst) {
            return false;
        }
        if exclusive {
            if self
                .consumers
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return false;
            }
            self.exclusive.store(true, Ordering::SeqCst);
        } else {
            self.consumers.fetch_add(1, Ordering::SeqCst);
        }
        true
    }

    fn detach(&self) {
        self.exclusive.store(false, Ordering::SeqCst);
        self.consumers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The shared in-process intermediary
///
/// Cloning yields another handle to the same server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    queues: Arc<DashMap<String, Arc<QueueData>>>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryServer {
    /// Create an empty server
    pub fn new() -> Self {
        info!("Initializing in-memory intermediary");
        Self::default()
    }

    /// Simulate the intermediary going away (or coming back)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of payloads waiting in a queue
    pub fn depth(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|q| q.messages.lock().len())
            .unwrap_or(0)
    }

    /// Number of consumers attached to a queue
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map(|q| q.consumers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Names of all queues declared by any connection
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.key().clone()).collect()
    }

    fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    fn declare(&self, name: &str) -> Arc<QueueData> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(queue = %name, "Queue created");
                Arc::new(QueueData::new(Queue::new(name)))
            })
            .value()
            .clone()
    }
}

/// One connection to a [`MemoryServer`]
pub struct MemoryBroker {
    server: MemoryServer,
    /// Queues declared on this connection
    queues: DashMap<String, Arc<QueueData>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl MemoryBroker {
    /// Open a connection to the server
    pub fn connect(server: &MemoryServer) -> Result<Self> {
        if !server.is_reachable() {
            return Err(Error::Connection("intermediary unreachable".to_string()));
        }

        debug!("Connected to in-memory intermediary");
        Ok(Self {
            server: server.clone(),
            queues: DashMap::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    fn declared(&self, name: &str) -> Result<Arc<QueueData>> {
        self.queues
            .get(name)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| Error::QueueNotDeclared(name.to_string()))
    }
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<Queue> {
        self.ensure_open()?;

        if !self.server.is_reachable() {
            return Err(Error::Declaration {
                queue: name.to_string(),
                reason: "intermediary unreachable".to_string(),
            });
        }

        let data = self.server.declare(name);
        let queue = data.queue.clone();
        self.queues.insert(name.to_string(), data);

        debug!(queue = %name, "Queue declared");
        Ok(queue)
    }

    async fn publish(&self, queue: &str, payload: Bytes, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let data = self.declared(queue)?;

        if !self.server.is_reachable() {
            return Err(Error::Publish {
                queue: queue.to_string(),
                reason: "intermediary unreachable".to_string(),
            });
        }

        tokio::time::timeout(timeout, async { data.push(payload) })
            .await
            .map_err(|_| Error::PublishTimeout(queue.to_string()))?;

        debug!(queue = %queue, "Message published");
        Ok(())
    }

    async fn consume(&self, queue: &str, config: &ConsumerConfig) -> Result<Subscription> {
        self.ensure_open()?;
        let data = self.declared(queue)?;

        if !data.attach(config.exclusive) {
            return Err(Error::Consume {
                queue: queue.to_string(),
                reason: "queue is held by an exclusive consumer".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        let cancel = self.shutdown.child_token();
        let stop = cancel.clone();
        let name = queue.to_string();

        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = stop.cancelled() => break,
                    permit = tx.reserve() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let payload = tokio::select! {
                    _ = stop.cancelled() => break,
                    payload = data.pop_wait() => payload,
                };

                if let Some(msg) = decode_delivery(&name, &payload) {
                    permit.send(msg);
                }
            }

            data.detach();
            debug!(queue = %name, "Subscription ended");
        });

        info!(queue = %queue, tag = %config.consumer_tag, "Subscription opened");
        Ok(Subscription::new(queue, rx, cancel))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("Connection already closed");
            return;
        }

        self.shutdown.cancel();
        self.queues.clear();
        info!("The connection was successfully closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocket_types::Message;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn payload(chat: i64, text: &str) -> Bytes {
        Message::new(chat, text).to_bytes().unwrap()
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();

        let first = broker.declare_queue("aiRequest").await.unwrap();
        let second = broker.declare_queue("aiRequest").await.unwrap();

        assert_eq!(first.name, "aiRequest");
        assert_eq!(second.name, first.name);
        assert_eq!(server.queue_names(), vec!["aiRequest".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_queue_fails() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();

        let err = broker
            .publish("nowhere", payload(1, "hi"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueNotDeclared(name) if name == "nowhere"));
    }

    #[tokio::test]
    async fn test_declaration_is_per_connection() {
        let server = MemoryServer::new();
        let producer = MemoryBroker::connect(&server).unwrap();
        let other = MemoryBroker::connect(&server).unwrap();

        producer.declare_queue("Response").await.unwrap();

        let err = other
            .publish("Response", payload(1, "hi"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueNotDeclared(_)));
    }

    #[tokio::test]
    async fn test_publish_and_consume_across_connections() {
        let server = MemoryServer::new();
        let producer = MemoryBroker::connect(&server).unwrap();
        let consumer = MemoryBroker::connect(&server).unwrap();

        producer.declare_queue("aiRequest").await.unwrap();
        consumer.declare_queue("aiRequest").await.unwrap();

        let mut sub = consumer
            .consume("aiRequest", &ConsumerConfig::default())
            .await
            .unwrap();

        producer
            .publish("aiRequest", payload(42, "Hello"), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(sub.next().await, Some(Message::new(42, "Hello")));
    }

    #[tokio::test]
    async fn test_queue_buffers_until_consumer_arrives() {
        let server = MemoryServer::new();
        let producer = MemoryBroker::connect(&server).unwrap();
        producer.declare_queue("aiRequest").await.unwrap();

        for i in 0..3 {
            producer
                .publish("aiRequest", payload(i, "queued"), TIMEOUT)
                .await
                .unwrap();
        }
        assert_eq!(server.depth("aiRequest"), 3);

        let consumer = MemoryBroker::connect(&server).unwrap();
        consumer.declare_queue("aiRequest").await.unwrap();
        let mut sub = consumer
            .consume("aiRequest", &ConsumerConfig::default())
            .await
            .unwrap();

        for i in 0..3 {
            assert_eq!(sub.next().await.unwrap().chat_id.0, i);
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();
        broker.declare_queue("Response").await.unwrap();

        let mut sub = broker
            .consume("Response", &ConsumerConfig::default())
            .await
            .unwrap();

        broker
            .publish("Response", Bytes::from_static(b"{not json"), TIMEOUT)
            .await
            .unwrap();
        broker
            .publish("Response", payload(7, "after"), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(sub.next().await, Some(Message::new(7, "after")));
    }

    #[tokio::test]
    async fn test_exclusive_consumer_blocks_others() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();
        broker.declare_queue("aiRequest").await.unwrap();

        let exclusive = ConsumerConfig {
            exclusive: true,
            ..Default::default()
        };
        let _sub = broker.consume("aiRequest", &exclusive).await.unwrap();

        let err = broker
            .consume("aiRequest", &ConsumerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Consume { .. }));
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();
        broker.declare_queue("aiRequest").await.unwrap();

        let mut sub = broker
            .consume("aiRequest", &ConsumerConfig::default())
            .await
            .unwrap();

        broker.close().await;
        assert_eq!(sub.next().await, None);

        let err = broker
            .publish("aiRequest", payload(1, "late"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        // Second close is a logged no-op
        broker.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let server = MemoryServer::new();
        let broker = MemoryBroker::connect(&server).unwrap();
        broker.declare_queue("aiRequest").await.unwrap();

        server.set_unreachable(true);

        assert!(matches!(
            MemoryBroker::connect(&server),
            Err(Error::Connection(_))
        ));
        let err = broker
            .publish("aiRequest", payload(1, "lost"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Publish { .. }));
        assert_eq!(server.depth("aiRequest"), 0);
    }
}
