//! One user/assistant round trip against the completion endpoint.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{ConfigError, CredentialProvider};
use crate::conversation::{Conversation, Turn};
use crate::llm::{ChatRequest, ClientFactory, ClientInitError, LLMError};

pub const CONFIGURATION_ERROR_MESSAGE: &str =
    "Configuration error. Please check your API key settings.";
pub const REMOTE_ERROR_MESSAGE: &str =
    "An error occurred while interacting with the Mistral API. Please try again later.";
pub const RESPONSE_FORMAT_ERROR_MESSAGE: &str =
    "An error occurred while processing the response, please try again later.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred, please try again later.";

/// Why an exchange fell back to a synthetic reply.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("client error: {0}")]
    Client(#[from] ClientInitError),

    #[error("remote error: {0}")]
    Remote(LLMError),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl From<LLMError> for ExchangeError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::InvalidResponse(msg) => ExchangeError::ResponseFormat(msg),
            other => ExchangeError::Remote(other),
        }
    }
}

impl ExchangeError {
    /// Text shown to the user in place of a reply.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExchangeError::Configuration(_) => CONFIGURATION_ERROR_MESSAGE,
            ExchangeError::Client(ClientInitError::InvalidCredential(_)) => {
                CONFIGURATION_ERROR_MESSAGE
            }
            ExchangeError::Client(ClientInitError::Build(_)) => UNEXPECTED_ERROR_MESSAGE,
            ExchangeError::Remote(_) => REMOTE_ERROR_MESSAGE,
            ExchangeError::ResponseFormat(_) => RESPONSE_FORMAT_ERROR_MESSAGE,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ExchangeError::Configuration(_) => "configuration",
            ExchangeError::Client(_) => "client",
            ExchangeError::Remote(_) => "remote",
            ExchangeError::ResponseFormat(_) => "response_format",
        }
    }
}

/// Runs exchanges for one configured model.
pub struct TurnExchange {
    credentials: CredentialProvider,
    factory: Arc<dyn ClientFactory>,
    model: String,
}

impl TurnExchange {
    pub fn new(
        credentials: CredentialProvider,
        factory: Arc<dyn ClientFactory>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            factory,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `user_input` with the whole history and return the next snapshot.
    ///
    /// On success the result is `conversation` plus the user turn and the reply.
    /// On any failure the result is a brand-new conversation holding only one
    /// assistant turn with a fixed error message: prior history and the
    /// submitted turn are dropped, and callers must store it as a reset.
    pub async fn exchange(&self, conversation: &Conversation, user_input: &str) -> Conversation {
        match self.try_exchange(conversation, user_input).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(category = e.category(), error = %e, "chat exchange failed");
                warn!(
                    discarded_turns = conversation.len(),
                    "conversation reset to a single fallback turn"
                );
                Conversation::single(Turn::assistant(e.user_message()))
            }
        }
    }

    /// Same steps as [`exchange`](Self::exchange), surfacing the failure instead of a fallback turn.
    pub async fn try_exchange(
        &self,
        conversation: &Conversation,
        user_input: &str,
    ) -> Result<Conversation, ExchangeError> {
        let credential = self.credentials.get_credential()?;
        let client = self.factory.create_client(&credential)?;

        let working = conversation.with_turn(Turn::user(user_input));
        let request = ChatRequest {
            model: self.model.clone(),
            messages: working.to_messages(),
        };

        let response = client.chat(request).await?;
        if let Some(usage) = response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        let reply = response.reply_text().ok_or_else(|| {
            ExchangeError::ResponseFormat(format!(
                "response had {} choices and no message content",
                response.choices.len()
            ))
        })?;

        Ok(working.with_turn(Turn::assistant(reply)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::conversation::render;
    use crate::llm::{ChatResponse, LLMProvider, Message, Role};

    enum Reply {
        Text(&'static str),
        Transport,
        Status(u16),
        Malformed,
        NoChoices,
    }

    struct StubProvider {
        reply: Reply,
        seen: Arc<Mutex<Vec<ChatRequest>>>,
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
            self.seen.lock().unwrap().push(request);
            match self.reply {
                Reply::Text(text) => Ok(serde_json::from_value(serde_json::json!({
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": text}}
                    ]
                }))
                .unwrap()),
                Reply::Transport => Err(LLMError::Request(request_error())),
                Reply::Status(status) => Err(LLMError::Api {
                    status,
                    message: "quota exceeded".to_string(),
                }),
                Reply::Malformed => Err(LLMError::InvalidResponse(
                    "missing field `choices`".to_string(),
                )),
                Reply::NoChoices => Ok(serde_json::from_value(serde_json::json!({
                    "choices": []
                }))
                .unwrap()),
            }
        }
    }

    /// A real `reqwest::Error`, produced without touching the network.
    fn request_error() -> reqwest::Error {
        reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
    }

    struct StubFactory {
        reply: fn() -> Reply,
        fail: Option<fn() -> ClientInitError>,
        seen: Arc<Mutex<Vec<ChatRequest>>>,
        credentials_seen: Arc<Mutex<Vec<String>>>,
    }

    impl ClientFactory for StubFactory {
        fn create_client(
            &self,
            credential: &str,
        ) -> Result<Arc<dyn LLMProvider>, ClientInitError> {
            self.credentials_seen
                .lock()
                .unwrap()
                .push(credential.to_string());
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            Ok(Arc::new(StubProvider {
                reply: (self.reply)(),
                seen: self.seen.clone(),
            }))
        }
    }

    struct Harness {
        exchange: TurnExchange,
        seen: Arc<Mutex<Vec<ChatRequest>>>,
        credentials_seen: Arc<Mutex<Vec<String>>>,
    }

    fn harness(
        credential: Option<&str>,
        reply: fn() -> Reply,
        fail: Option<fn() -> ClientInitError>,
    ) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let credentials_seen = Arc::new(Mutex::new(Vec::new()));
        let factory = StubFactory {
            reply,
            fail,
            seen: seen.clone(),
            credentials_seen: credentials_seen.clone(),
        };
        let exchange = TurnExchange::new(
            CredentialProvider::new("MISTRAL_API_KEY", credential.map(str::to_string)),
            Arc::new(factory),
            "codestral-mamba-latest",
        );
        Harness {
            exchange,
            seen,
            credentials_seen,
        }
    }

    fn history() -> Conversation {
        [
            Turn::user("What is the syntax for a for loop in Python?"),
            Turn::assistant("for x in xs:"),
            Turn::user("And a while loop?"),
            Turn::assistant("while cond:"),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_first_exchange_end_to_end() {
        let h = harness(Some("sk-test"), || Reply::Text("4"), None);

        let result = h.exchange.exchange(&Conversation::new(), "What is 2+2?").await;

        assert_eq!(
            result.turns(),
            &[Turn::user("What is 2+2?"), Turn::assistant("4")]
        );
        assert_eq!(render(&result), "User: What is 2+2?\nAssistant: 4");
    }

    #[tokio::test]
    async fn test_success_appends_two_turns_and_keeps_prefix() {
        let h = harness(Some("sk-test"), || Reply::Text("Use a list comprehension."), None);
        let prior = history();

        let result = h.exchange.exchange(&prior, "Shorter please").await;

        assert_eq!(result.len(), prior.len() + 2);
        assert_eq!(&result.turns()[..prior.len()], prior.turns());
        assert_eq!(result.turns()[4], Turn::user("Shorter please"));
        assert_eq!(
            result.turns()[5],
            Turn::assistant("Use a list comprehension.")
        );
        // the caller's snapshot is untouched
        assert_eq!(prior, history());
    }

    #[tokio::test]
    async fn test_full_history_and_model_are_sent() {
        let h = harness(Some("sk-test"), || Reply::Text("ok"), None);

        h.exchange.exchange(&history(), "next").await;

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "codestral-mamba-latest");
        assert_eq!(seen[0].messages.len(), 5);
        assert_eq!(seen[0].messages[0].role, Role::User);
        assert_eq!(
            seen[0].messages[4],
            Message {
                role: Role::User,
                content: "next".to_string(),
            }
        );
        assert_eq!(*h.credentials_seen.lock().unwrap(), vec!["sk-test"]);
    }

    #[tokio::test]
    async fn test_missing_credential_resets_to_configuration_message() {
        let h = harness(None, || Reply::Text("unused"), None);

        for prior in [Conversation::new(), history()] {
            let result = h.exchange.exchange(&prior, "hello").await;
            assert_eq!(
                result.turns(),
                &[Turn::assistant(CONFIGURATION_ERROR_MESSAGE)]
            );
        }
        assert!(h.credentials_seen.lock().unwrap().is_empty());
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_credential_is_a_configuration_error() {
        let h = harness(
            Some("sk-test"),
            || Reply::Text("unused"),
            Some(|| ClientInitError::InvalidCredential("bad".to_string())),
        );

        let result = h.exchange.exchange(&history(), "hello").await;
        assert_eq!(
            result.turns(),
            &[Turn::assistant(CONFIGURATION_ERROR_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn test_client_build_failure_is_unexpected() {
        let h = harness(
            Some("sk-test"),
            || Reply::Text("unused"),
            Some(|| ClientInitError::Build(request_error())),
        );

        let result = h.exchange.exchange(&history(), "hello").await;
        assert_eq!(result.turns(), &[Turn::assistant(UNEXPECTED_ERROR_MESSAGE)]);
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_fault_resets_to_remote_message() {
        let h = harness(Some("sk-test"), || Reply::Transport, None);

        for prior in [Conversation::new(), history()] {
            let result = h.exchange.exchange(&prior, "hello").await;
            assert_eq!(result.len(), 1);
            assert_eq!(result.turns()[0], Turn::assistant(REMOTE_ERROR_MESSAGE));
            assert_ne!(result, prior.with_turn(Turn::user("hello")));
        }

        let err = h
            .exchange
            .try_exchange(&history(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Remote(LLMError::Request(_))));
    }

    #[tokio::test]
    async fn test_api_status_error_is_remote() {
        let h = harness(Some("sk-test"), || Reply::Status(401), None);

        let err = h
            .exchange
            .try_exchange(&history(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Remote(LLMError::Api { status: 401, .. })));
        assert_eq!(err.user_message(), REMOTE_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_body_is_response_format_error() {
        let h = harness(Some("sk-test"), || Reply::Malformed, None);

        let result = h.exchange.exchange(&history(), "hello").await;
        assert_eq!(
            result.turns(),
            &[Turn::assistant(RESPONSE_FORMAT_ERROR_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn test_empty_choices_is_response_format_error() {
        let h = harness(Some("sk-test"), || Reply::NoChoices, None);

        let err = h
            .exchange
            .try_exchange(&Conversation::new(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ResponseFormat(_)));
    }

    #[test]
    fn test_user_message_by_category() {
        let config = ExchangeError::Configuration(ConfigError::MissingCredential {
            var: "MISTRAL_API_KEY".to_string(),
        });
        assert_eq!(config.user_message(), CONFIGURATION_ERROR_MESSAGE);
        assert_eq!(
            ExchangeError::from(LLMError::RateLimit { retry_after: None }).user_message(),
            REMOTE_ERROR_MESSAGE
        );
        assert_eq!(
            ExchangeError::from(LLMError::InvalidResponse("x".to_string())).user_message(),
            RESPONSE_FORMAT_ERROR_MESSAGE
        );
    }
}
