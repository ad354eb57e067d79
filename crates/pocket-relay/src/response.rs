//! Response relay
//!
//! Solver side: consumes prompts from the request queue, asks the solver and
//! publishes the answer to the response queue under the same chat.

use std::sync::Arc;
use std::time::Duration;

use pocket_broker::QueueBroker;
use pocket_types::{Error, Message, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{RelayConfig, Settings};
use crate::notices;
use crate::pool::{dispatch, TaskPool};
use crate::solver::{ChatRequest, Solver, SolverError};

/// Turns prompts into answers
pub struct ResponseRelay {
    consumer: Arc<dyn QueueBroker>,
    producer: Arc<dyn QueueBroker>,
    solver: Arc<dyn Solver>,
    settings: Arc<Settings>,
    request_queue: String,
    response_queue: String,
    model: String,
    publish_timeout: Duration,
    solver_timeout: Option<Duration>,
}

impl ResponseRelay {
    /// Queue names, model and deadlines come from `config`
    pub fn new(
        consumer: Arc<dyn QueueBroker>,
        producer: Arc<dyn QueueBroker>,
        solver: Arc<dyn Solver>,
        settings: Arc<Settings>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            consumer,
            producer,
            solver,
            settings,
            request_queue: config.request_queue.clone(),
            response_queue: config.response_queue.clone(),
            model: config.model.clone(),
            publish_timeout: config.publish_timeout,
            solver_timeout: config.solver_timeout,
        }
    }

    /// Consume the request queue until cancelled or the subscription ends
    ///
    /// Fails only if the subscription cannot be opened.
    pub async fn run(self: Arc<Self>, pool: TaskPool, cancel: CancellationToken) -> Result<()> {
        let options = self.settings.consumer_config()?;
        let subscription = self.consumer.consume(&self.request_queue, &options).await?;
        info!(queue = %self.request_queue, "Response relay started");

        let relay = Arc::clone(&self);
        dispatch(subscription, &pool, &cancel, move |msg| {
            let relay = Arc::clone(&relay);
            async move {
                if let Err(e) = relay.answer(msg).await {
                    error!(error = %e, "Unable to publish message to the front-door service");
                }
            }
        })
        .await;

        info!(queue = %self.request_queue, "Response relay stopped");
        Ok(())
    }

    /// Answer one prompt and publish the result
    #[instrument(name = "response_relay", skip_all, fields(chat_id = %msg.chat_id))]
    pub async fn answer(&self, mut msg: Message) -> Result<()> {
        if msg.is_empty() {
            debug!("Ignoring prompt without text");
            return Ok(());
        }

        let request = ChatRequest::user(&self.model, &msg.text);
        match self.ask(request).await {
            Ok(answer) => msg.replace_text(answer),
            Err(e) => {
                warn!(error = %e, "Solver failed, answering with the failure notice");
                msg.replace_text(notices::SERVICE_UNAVAILABLE);
            }
        }

        let payload = msg.to_bytes().map_err(|e| {
            error!(error = %e, "Unable to convert into json");
            Error::Serialization(e)
        })?;

        self.producer
            .publish(&self.response_queue, payload, self.publish_timeout)
            .await?;

        debug!(queue = %self.response_queue, "Answer queued");
        Ok(())
    }

    async fn ask(&self, request: ChatRequest) -> std::result::Result<String, SolverError> {
        let response = match self.solver_timeout {
            Some(limit) => tokio::time::timeout(limit, self.solver.chat(request))
                .await
                .map_err(|_| SolverError::Timeout)??,
            None => self.solver.chat(request).await?,
        };
        response.into_answer()
    }
}
