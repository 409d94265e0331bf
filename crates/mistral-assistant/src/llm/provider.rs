//! LLM provider trait and the Mistral implementation.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::{LLMError, check_response_error};
use super::types::{ChatRequest, ChatResponse};

/// A chat-completion capability.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;
}

/// Mistral `/chat/completions` provider.
///
/// Authentication is carried by the client's default headers, see
/// [`MistralClientFactory`](super::MistralClientFactory).
pub struct MistralProvider {
    client: Client,
    base_url: String,
}

impl MistralProvider {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LLMProvider for MistralProvider {
    #[tracing::instrument(
        name = "mistral_chat",
        skip(self, request),
        fields(model = %request.model, messages = request.messages.len()),
        err
    )]
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self.client.post(&url).json(&request).send().await?;

        if let Some(err) = check_response_error(&response) {
            return Err(err);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;
        debug!(id = ?parsed.id, choices = parsed.choices.len(), "chat completion received");
        Ok(parsed)
    }
}
