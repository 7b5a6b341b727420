//! Chatgate - token-budget-aware streaming gateway for LLM chat completions
//!
//! This crate relays client chat requests to an upstream LLM-serving API.
//! The message history is truncated to the target entity's token budget, the
//! upstream Server-Sent-Events response is transcoded into a NUL-delimited
//! JSON chunk stream, and upstream failures are mapped to a small, safe
//! error taxonomy before they reach the client.

pub mod budget;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod relay;
pub mod tokens;
pub mod upstream;

pub use error::RelayError;
