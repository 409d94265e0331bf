//! Mistral coding assistant - a minimal browser chat front-end for Mistral models.

pub mod config;
pub mod conversation;
pub mod exchange;
pub mod handlers;
pub mod llm;
pub mod logging;
pub mod presentation;
pub mod response;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, CredentialProvider, DeployMode};
pub use conversation::{Conversation, Turn, render};
pub use exchange::{ExchangeError, TurnExchange};
