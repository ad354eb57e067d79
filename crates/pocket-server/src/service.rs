//! Startup and shutdown shared by both binaries

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use pocket_broker::{AmqpBroker, QueueBroker};
use pocket_relay::{RelayConfig, Settings, TaskPool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::health;

/// Everything a service needs once configuration is read
pub struct Service {
    pub name: &'static str,
    pub settings: Arc<Settings>,
    pub config: RelayConfig,
    pub cancel: CancellationToken,
    pools: Vec<TaskPool>,
    brokers: Vec<Arc<AmqpBroker>>,
}

impl Service {
    /// Load secrets and settings
    pub fn load(name: &'static str, cli: &Cli) -> anyhow::Result<Self> {
        dotenvy::from_path(&cli.env_file)
            .with_context(|| format!("Unable to load secrets from {}", cli.env_file.display()))?;

        let settings = Settings::load(&cli.config)
            .with_context(|| format!("Unable to load settings from {}", cli.config.display()))?;
        let config = RelayConfig::from_settings(&settings)?;

        info!(
            service = name,
            broker = %config.broker_url,
            request_queue = %config.request_queue,
            response_queue = %config.response_queue,
            max_in_flight = config.max_in_flight,
            "Configuration loaded"
        );

        Ok(Self {
            name,
            settings: Arc::new(settings),
            config,
            cancel: CancellationToken::new(),
            pools: Vec::new(),
            brokers: Vec::new(),
        })
    }

    /// Task pool for one relay loop, drained at shutdown
    ///
    /// Every loop gets its own pool so one role cannot starve another.
    pub fn pool(&mut self) -> TaskPool {
        let pool = TaskPool::new(self.config.max_in_flight);
        self.pools.push(pool.clone());
        pool
    }

    /// Open one connection to the intermediary and declare both queues on it
    pub async fn connect(&mut self, role: &str) -> anyhow::Result<Arc<AmqpBroker>> {
        let broker = AmqpBroker::connect(&self.config.broker_url)
            .await
            .with_context(|| format!("Unable to connect the {role} to the intermediary"))?;

        for queue in [&self.config.request_queue, &self.config.response_queue] {
            broker
                .declare_queue(queue)
                .await
                .with_context(|| format!("Unable to declare queue {queue}"))?;
        }

        info!(role, "Connected to the intermediary");
        let broker = Arc::new(broker);
        self.brokers.push(Arc::clone(&broker));
        Ok(broker)
    }

    /// Serve the health endpoint when an address was given
    pub fn spawn_health(&self, cli: &Cli) {
        if let Some(addr) = cli.health_addr {
            let (name, cancel) = (self.name, self.cancel.clone());
            tokio::spawn(async move {
                if let Err(e) = health::serve(addr, name, cancel).await {
                    error!(error = %e, "Health endpoint stopped");
                }
            });
        }
    }

    /// Run until a shutdown signal or until the relay stops on its own
    pub async fn supervise(&self, relay: JoinHandle<pocket_types::Result<()>>) -> anyhow::Result<()> {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
            finished = relay => match finished {
                Ok(Ok(())) => {
                    warn!("Relay stopped before shutdown");
                    Ok(())
                }
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("Relay failed")),
                Err(e) => Err(anyhow::Error::new(e).context("Relay task panicked")),
            },
        }
    }

    /// Stop intake, drain in-flight work and close every connection
    pub async fn shutdown(self) {
        self.cancel.cancel();

        let deadline = Instant::now() + self.config.shutdown_grace;
        for pool in &self.pools {
            let grace = deadline.saturating_duration_since(Instant::now());
            if !pool.shutdown(grace).await {
                warn!(
                    grace_secs = self.config.shutdown_grace.as_secs(),
                    in_flight = pool.in_flight(),
                    "In-flight work abandoned after the grace period"
                );
            }
        }

        for broker in &self.brokers {
            broker.close().await;
        }
        info!(service = self.name, "Service stopped");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
