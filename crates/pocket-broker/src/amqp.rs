//! AMQP broker backend
//!
//! Talks to a RabbitMQ-compatible intermediary through `lapin`. Queues are
//! published to through the default exchange, so the routing key is the
//! queue name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use pocket_types::{ConsumerConfig, Error, Queue, QueueProperties, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::subscription::{decode_delivery, Subscription, HANDOFF_CAPACITY};
use crate::traits::QueueBroker;

const CONTENT_TYPE: &str = "text/plain";
const REPLY_SUCCESS: u16 = 200;

/// A connection and a channel to an AMQP intermediary
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    /// Queues declared on this channel
    queues: DashMap<String, Queue>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl AmqpBroker {
    /// Open the transport connection and one channel on it
    ///
    /// No retry: DNS, auth and refused connections fail straight away.
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                error!(error = %e, "Unable to connect to the intermediary");
                Error::Connection(e.to_string())
            })?;

        let channel = connection.create_channel().await.map_err(|e| {
            error!(error = %e, "Unable to create a channel");
            Error::Connection(format!("failed to create channel: {e}"))
        })?;

        info!(channel = channel.id(), "Connected to the intermediary");

        Ok(Self {
            connection,
            channel,
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

    fn routing_key(&self, queue: &str) -> Result<String> {
        self.queues
            .get(queue)
            .map(|q| q.name.clone())
            .ok_or_else(|| Error::QueueNotDeclared(queue.to_string()))
    }
}

#[async_trait]
impl QueueBroker for AmqpBroker {
    async fn declare_queue(&self, name: &str) -> Result<Queue> {
        self.ensure_open()?;

        if let Some(queue) = self.queues.get(name) {
            return Ok(queue.clone());
        }

        let properties = QueueProperties::default();
        let options = QueueDeclareOptions {
            passive: false,
            durable: properties.durable,
            exclusive: properties.exclusive,
            auto_delete: properties.auto_delete,
            nowait: properties.no_wait,
        };

        let declared = self
            .channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map_err(|e| {
                error!(queue = %name, error = %e, "Unable to declare queue");
                Error::Declaration {
                    queue: name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let queue = Queue::new(declared.name().as_str());
        self.queues.insert(name.to_string(), queue.clone());

        info!(
            queue = %name,
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "Queue declared"
        );
        Ok(queue)
    }

    async fn publish(&self, queue: &str, payload: Bytes, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let routing_key = self.routing_key(queue)?;

        let properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());
        let publish = self.channel.basic_publish(
            "",
            &routing_key,
            BasicPublishOptions::default(),
            &payload,
            properties,
        );

        match tokio::time::timeout(timeout, publish).await {
            Ok(Ok(_confirm)) => {
                debug!(queue = %queue, size = payload.len(), "Message published");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(queue = %queue, error = %e, "Unable to publish a message");
                Err(Error::Publish {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                error!(queue = %queue, timeout = ?timeout, "Publish timed out");
                Err(Error::PublishTimeout(queue.to_string()))
            }
        }
    }

    async fn consume(&self, queue: &str, config: &ConsumerConfig) -> Result<Subscription> {
        self.ensure_open()?;
        let name = self.routing_key(queue)?;

        let options = BasicConsumeOptions {
            no_local: config.no_local,
            no_ack: config.auto_ack,
            exclusive: config.exclusive,
            nowait: config.no_wait,
        };

        let mut consumer = self
            .channel
            .basic_consume(&name, &config.consumer_tag, options, FieldTable::default())
            .await
            .map_err(|e| {
                error!(queue = %queue, error = %e, "Unable to open a subscription");
                Error::Consume {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let tag = consumer.tag().as_str().to_string();
        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        let cancel = self.shutdown.child_token();
        let stop = cancel.clone();
        let channel = self.channel.clone();
        let auto_ack = config.auto_ack;
        let queue_name = queue.to_string();

        info!(queue = %queue, tag = %tag, auto_ack, "Subscription opened");

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = stop.cancelled() => break,
                    next = consumer.next() => next,
                };

                let delivery = match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        error!(queue = %queue_name, error = %e, "Subscription failed");
                        break;
                    }
                    None => {
                        info!(queue = %queue_name, "Intermediary ended the subscription");
                        break;
                    }
                };

                if let Some(msg) = decode_delivery(&queue_name, &delivery.data) {
                    let handed_off = tokio::select! {
                        _ = stop.cancelled() => false,
                        sent = tx.send(msg) => sent.is_ok(),
                    };
                    // Unacked deliveries go back to the queue once the channel closes
                    if !handed_off {
                        break;
                    }
                }

                if !auto_ack {
                    if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                        warn!(queue = %queue_name, error = %e, "Unable to ack delivery");
                    }
                }
            }

            if channel.status().connected() {
                if let Err(e) = channel
                    .basic_cancel(&tag, BasicCancelOptions::default())
                    .await
                {
                    debug!(queue = %queue_name, error = %e, "Unable to cancel consumer");
                }
            }
            debug!(queue = %queue_name, "Subscription ended");
        });

        Ok(Subscription::new(queue, rx, cancel))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            warn!("Connection already closed");
            return;
        }

        self.shutdown.cancel();

        match self.channel.close(REPLY_SUCCESS, "closing").await {
            Ok(()) => info!("The channel was successfully closed"),
            Err(e) => error!(error = %e, "Unable to close the channel"),
        }

        match self.connection.close(REPLY_SUCCESS, "closing").await {
            Ok(()) => info!("The connection was successfully closed"),
            Err(e) => error!(error = %e, "Unable to close the connection"),
        }
    }
}
