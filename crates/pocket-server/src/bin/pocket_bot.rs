//! Front-door service
//!
//! Polls Telegram, queues every prompt on the request queue and delivers
//! answers from the response queue back to their chats.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pocket_relay::config::{keys, secret};
use pocket_relay::{DeliveryRelay, Listener, RequestRelay};
use pocket_server::{logging, telegram, Cli, Service, TelegramFrontDoor};
use tracing::info;

const SERVICE: &str = "pocket-bot";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(SERVICE, &cli.log_dir)?;

    let mut service = Service::load(SERVICE, &cli)?;
    service.spawn_health(&cli);

    let token = secret("BOT_TOKEN")?;
    let api_url = service
        .settings
        .get(keys::TELEGRAM_API_URL)
        .unwrap_or(telegram::DEFAULT_API_URL);
    let front_door = Arc::new(TelegramFrontDoor::new(api_url, &token)?);

    let me = front_door
        .get_me()
        .await
        .context("Unable to reach the Telegram API")?;
    info!(
        username = me.username.as_deref().unwrap_or_default(),
        "Bot successfully created and connected to the Telegram API"
    );

    let producer = service.connect("producer").await?;
    let consumer = service.connect("consumer").await?;

    let delivery = Arc::new(DeliveryRelay::new(
        consumer,
        front_door.clone(),
        Arc::clone(&service.settings),
        &service.config.response_queue,
    ));
    let delivery_task = tokio::spawn(delivery.run(service.pool(), service.cancel.clone()));

    let request = Arc::new(RequestRelay::new(
        producer,
        front_door.clone(),
        &service.config.request_queue,
        service.config.publish_timeout,
    ));
    let listener = Listener::new(front_door, request, service.pool());
    let cancel = service.cancel.clone();
    tokio::spawn(async move { listener.run(cancel).await });

    let outcome = service.supervise(delivery_task).await;
    service.shutdown().await;
    outcome
}
