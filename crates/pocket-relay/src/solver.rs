//! Solver interface
//!
//! The computation backend that turns a prompt into an answer. The request
//! and response shapes follow the OpenAI Chat Completions API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a solver
#[derive(Error, Debug)]
pub enum SolverError {
    /// The request never got a response
    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend answered with a non-success status
    #[error("Solver returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body could not be understood
    #[error("Unable to decode solver response: {0}")]
    Decode(String),

    /// The response carried no choices
    #[error("Solver returned no candidate answers")]
    NoChoices,

    /// The call outlived its deadline
    #[error("Solver call timed out")]
    Timeout,
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A call to the solver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Single user prompt for the given model
    pub fn user(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

/// What the solver answered
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Response with a single answer
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: content.into(),
                },
            }],
        }
    }

    /// Content of the first choice
    pub fn into_answer(self) -> Result<String, SolverError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(SolverError::NoChoices)
    }
}

/// The computation backend
#[async_trait]
pub trait Solver: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SolverError>;
}
