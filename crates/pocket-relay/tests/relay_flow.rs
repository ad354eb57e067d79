//! Both services wired together over one in-memory intermediary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pocket_broker::{MemoryBroker, MemoryServer, QueueBroker};
use pocket_relay::config::keys;
use pocket_relay::notices;
use pocket_relay::{
    ChatRequest, ChatResponse, DeliveryRelay, FrontDoor, InboundEvent, RelayConfig,
    RequestRelay, ResponseRelay, Settings, Solver, SolverError, TaskPool, TransportError,
};
use pocket_types::{ChatId, REQUEST_QUEUE, RESPONSE_QUEUE};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ChatWindow {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl ChatWindow {
    async fn wait_for(&self, count: usize) -> Vec<(ChatId, String)> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let sent = self.sent.lock().clone();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("chat window never received the expected messages")
    }
}

#[async_trait]
impl FrontDoor for ChatWindow {
    async fn next_updates(&self) -> Result<Vec<InboundEvent>, TransportError> {
        Ok(Vec::new())
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}

struct EchoSolver {
    healthy: bool,
}

#[async_trait]
impl Solver for EchoSolver {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SolverError> {
        if !self.healthy {
            return Err(SolverError::Http("connection refused".to_string()));
        }
        match request.messages.first() {
            Some(m) if m.content == "Hello" => Ok(ChatResponse::answer("Hi there")),
            Some(m) => Ok(ChatResponse::answer(format!("echo: {}", m.content))),
            None => Ok(ChatResponse::default()),
        }
    }
}

fn settings() -> Arc<Settings> {
    Arc::new(Settings::from_pairs([
        (keys::CONSUMER_AUTO_ACK, "true"),
        (keys::CONSUMER_EXCLUSIVE, "false"),
        (keys::CONSUMER_NO_LOCAL, "false"),
        (keys::CONSUMER_NO_WAIT, "false"),
        (keys::CONSUMER_TAG, ""),
    ]))
}

async fn connect(server: &MemoryServer) -> Arc<MemoryBroker> {
    let broker = MemoryBroker::connect(server).unwrap();
    broker.declare_queue(REQUEST_QUEUE).await.unwrap();
    broker.declare_queue(RESPONSE_QUEUE).await.unwrap();
    Arc::new(broker)
}

struct Deployment {
    server: MemoryServer,
    chat: Arc<ChatWindow>,
    request: RequestRelay,
    pool: TaskPool,
    cancel: CancellationToken,
}

/// Start both services against one intermediary
async fn deploy(solver: EchoSolver) -> Deployment {
    let server = MemoryServer::new();
    let chat = Arc::new(ChatWindow::default());
    let settings = settings();
    let pool = TaskPool::new(8);
    let cancel = CancellationToken::new();

    // front-door service
    let front_producer = connect(&server).await;
    let front_consumer = connect(&server).await;
    let request = RequestRelay::new(front_producer, chat.clone(), REQUEST_QUEUE, TIMEOUT);
    let delivery = Arc::new(DeliveryRelay::new(
        front_consumer,
        chat.clone(),
        Arc::clone(&settings),
        RESPONSE_QUEUE,
    ));
    tokio::spawn(delivery.run(pool.clone(), cancel.clone()));

    // solver service
    let ai_producer = connect(&server).await;
    let ai_consumer = connect(&server).await;
    let config = RelayConfig::from_settings(&Settings::from_pairs([(
        keys::BROKER_URL,
        "amqp://localhost",
    )]))
    .unwrap();
    let response = Arc::new(ResponseRelay::new(
        ai_consumer,
        ai_producer,
        Arc::new(solver),
        settings,
        &config,
    ));
    tokio::spawn(response.run(pool.clone(), cancel.clone()));

    Deployment {
        server,
        chat,
        request,
        pool,
        cancel,
    }
}

#[tokio::test]
async fn test_prompt_round_trip() {
    let d = deploy(EchoSolver { healthy: true }).await;

    d.request
        .handle(&InboundEvent::text(1, 42, "Hello"))
        .await
        .unwrap();

    let sent = d.chat.wait_for(2).await;
    assert_eq!(
        sent,
        vec![
            (ChatId(42), notices::PLEASE_WAIT.to_string()),
            (ChatId(42), "Hi there".to_string()),
        ]
    );

    d.cancel.cancel();
    assert!(d.pool.shutdown(TIMEOUT).await);
}

#[tokio::test]
async fn test_solver_outage_reaches_user_as_notice() {
    let d = deploy(EchoSolver { healthy: false }).await;

    d.request
        .handle(&InboundEvent::text(1, 42, "Hello"))
        .await
        .unwrap();

    let sent = d.chat.wait_for(2).await;
    assert_eq!(sent[1], (ChatId(42), notices::SERVICE_UNAVAILABLE.to_string()));

    d.cancel.cancel();
    assert!(d.pool.shutdown(TIMEOUT).await);
}

#[tokio::test]
async fn test_answers_follow_their_chats() {
    let d = deploy(EchoSolver { healthy: true }).await;

    for (id, chat) in [(1, 100), (2, 200), (3, 300)] {
        d.request
            .handle(&InboundEvent::text(id, chat, format!("question {chat}")))
            .await
            .unwrap();
    }

    let sent = d.chat.wait_for(6).await;
    for chat in [100, 200, 300] {
        assert!(sent.contains(&(ChatId(chat), format!("echo: question {chat}"))));
    }

    d.cancel.cancel();
    assert!(d.pool.shutdown(TIMEOUT).await);
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_relays() {
    let d = deploy(EchoSolver { healthy: true }).await;

    let intruder = connect(&d.server).await;
    intruder
        .publish(REQUEST_QUEUE, Bytes::from_static(b"not json"), TIMEOUT)
        .await
        .unwrap();
    intruder
        .publish(RESPONSE_QUEUE, Bytes::from_static(b"{\"from\":"), TIMEOUT)
        .await
        .unwrap();

    d.request
        .handle(&InboundEvent::text(1, 42, "Hello"))
        .await
        .unwrap();

    let sent = d.chat.wait_for(2).await;
    assert_eq!(sent[1], (ChatId(42), "Hi there".to_string()));

    d.cancel.cancel();
    assert!(d.pool.shutdown(TIMEOUT).await);
}
