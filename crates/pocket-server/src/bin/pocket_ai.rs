//! Solver service
//!
//! Answers prompts from the request queue with the OpenAI chat API and
//! publishes the answers to the response queue.

use std::sync::Arc;

use clap::Parser;
use pocket_relay::config::{keys, secret};
use pocket_relay::ResponseRelay;
use pocket_server::{logging, openai, Cli, OpenAiSolver, Service};

const SERVICE: &str = "pocket-ai";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(SERVICE, &cli.log_dir)?;

    let mut service = Service::load(SERVICE, &cli)?;
    service.spawn_health(&cli);

    let api_key = secret("GPT_TOKEN")?;
    let api_url = service
        .settings
        .get(keys::AI_API_URL)
        .unwrap_or(openai::DEFAULT_API_URL);
    let solver = Arc::new(OpenAiSolver::new(api_url, api_key));

    let producer = service.connect("producer").await?;
    let consumer = service.connect("consumer").await?;

    let relay = Arc::new(ResponseRelay::new(
        consumer,
        producer,
        solver,
        Arc::clone(&service.settings),
        &service.config,
    ));

    let pool = service.pool();
    let relay_task = tokio::spawn(relay.run(pool, service.cancel.clone()));

    let outcome = service.supervise(relay_task).await;
    service.shutdown().await;
    outcome
}
