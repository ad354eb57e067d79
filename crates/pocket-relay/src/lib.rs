//! Pocket Relay - Request/response relays over the intermediary
//!
//! This crate turns the broker's publish/consume primitives into a
//! request-response protocol between two services:
//! - Front-door service: [`Listener`] + [`RequestRelay`] + [`DeliveryRelay`]
//! - Solver service: [`ResponseRelay`]
//!
//! The two services share nothing but the request and response queues.

pub mod config;
pub mod delivery;
pub mod front_door;
pub mod listener;
pub mod notices;
pub mod pool;
pub mod request;
pub mod response;
pub mod solver;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{RelayConfig, Settings};
pub use delivery::DeliveryRelay;
pub use front_door::{ChatRef, FrontDoor, InboundEvent, TransportError};
pub use listener::Listener;
pub use pool::TaskPool;
pub use request::RequestRelay;
pub use response::ResponseRelay;
pub use solver::{ChatMessage, ChatRequest, ChatResponse, Solver, SolverError};
