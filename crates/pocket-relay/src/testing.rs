//! Test doubles for the front door and the solver

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pocket_types::ChatId;

use crate::config::{keys, Settings};
use crate::front_door::{FrontDoor, InboundEvent, TransportError};
use crate::solver::{ChatRequest, ChatResponse, Solver, SolverError};

pub(crate) fn consumer_settings() -> Arc<Settings> {
    Arc::new(Settings::from_pairs([
        (keys::CONSUMER_AUTO_ACK, "true"),
        (keys::CONSUMER_EXCLUSIVE, "false"),
        (keys::CONSUMER_NO_LOCAL, "false"),
        (keys::CONSUMER_NO_WAIT, "false"),
        (keys::CONSUMER_TAG, ""),
    ]))
}

/// Front door that records what was sent and replays scripted updates
#[derive(Default)]
pub(crate) struct RecordingFrontDoor {
    sent: Mutex<Vec<(ChatId, String)>>,
    updates: Mutex<VecDeque<Result<Vec<InboundEvent>, TransportError>>>,
    fail_sends: AtomicBool,
}

impl RecordingFrontDoor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_updates(&self, updates: Result<Vec<InboundEvent>, TransportError>) {
        self.updates.lock().push_back(updates);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().clone()
    }

    /// Wait until at least `count` sends were recorded
    pub async fn wait_for_sent(&self, count: usize) -> Vec<(ChatId, String)> {
        let wait = async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("front door never received the expected messages")
    }
}

#[async_trait]
impl FrontDoor for RecordingFrontDoor {
    async fn next_updates(&self) -> Result<Vec<InboundEvent>, TransportError> {
        let next = self.updates.lock().pop_front();
        match next {
            Some(updates) => updates,
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Http("front door offline".to_string()));
        }
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub(crate) enum Behaviour {
    Answer(String),
    Fail,
    NoChoices,
    Hang,
}

/// Solver with a fixed behaviour that records every request
pub(crate) struct ScriptedSolver {
    behaviour: Behaviour,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedSolver {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(text: &str) -> Arc<Self> {
        Self::new(Behaviour::Answer(text.to_string()))
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Solver for ScriptedSolver {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SolverError> {
        self.requests.lock().push(request);
        match &self.behaviour {
            Behaviour::Answer(text) => Ok(ChatResponse::answer(text.clone())),
            Behaviour::Fail => Err(SolverError::Api {
                status: 503,
                body: "overloaded".to_string(),
            }),
            Behaviour::NoChoices => Ok(ChatResponse::default()),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}
