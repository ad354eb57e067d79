//! OpenAI chat completions solver

use async_trait::async_trait;
use pocket_relay::{ChatRequest, ChatResponse, Solver, SolverError};
use reqwest::Client;
use tracing::{debug, error};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiSolver {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenAiSolver {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Solver for OpenAiSolver {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, SolverError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SolverError::Http(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            error!(status = status.as_u16(), "OpenAI error: {}", body);
            return Err(SolverError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let answer: ChatResponse = response
            .json()
            .await
            .map_err(|e| SolverError::Decode(e.without_url().to_string()))?;
        debug!(choices = answer.choices.len(), "Completion received");
        Ok(answer)
    }
}
