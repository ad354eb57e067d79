//! Pocket Server - Service binaries for the relay
//!
//! Two processes share this crate:
//! - `pocket-bot`: Telegram front door, request relay and delivery relay
//! - `pocket-ai`: response relay in front of the OpenAI chat API
//!
//! They talk to each other only through the intermediary.

pub mod cli;
pub mod health;
pub mod logging;
pub mod openai;
pub mod service;
pub mod telegram;

pub use cli::Cli;
pub use openai::OpenAiSolver;
pub use service::Service;
pub use telegram::TelegramFrontDoor;
