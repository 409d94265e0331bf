//! Mistral chat-completion client.

mod error;
mod factory;
mod provider;
mod types;

pub use error::{ClientInitError, LLMError};
pub use factory::{ClientFactory, MistralClientFactory};
pub use provider::{LLMProvider, MistralProvider};
pub use types::{ChatRequest, ChatResponse, Choice, Message, ResponseMessage, Role, Usage};
