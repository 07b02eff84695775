//! Chat-completion client for OpenAI-compatible and Azure endpoints.

pub mod client;

pub use client::{ChatClient, ChatError, ChatMessage, Role};
