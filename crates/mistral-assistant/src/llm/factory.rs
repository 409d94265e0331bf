//! Construction of completion clients from a credential.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::error;

use super::error::ClientInitError;
use super::provider::{LLMProvider, MistralProvider};

/// Builds a completion client for a credential. Construction is local; no request is sent.
pub trait ClientFactory: Send + Sync {
    fn create_client(&self, credential: &str) -> Result<Arc<dyn LLMProvider>, ClientInitError>;
}

/// Factory for [`MistralProvider`] clients.
#[derive(Debug, Clone)]
pub struct MistralClientFactory {
    base_url: String,
    timeout: Duration,
}

impl MistralClientFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ClientFactory for MistralClientFactory {
    fn create_client(&self, credential: &str) -> Result<Arc<dyn LLMProvider>, ClientInitError> {
        let headers = match auth_headers(credential) {
            Ok(h) => h,
            Err(e) => {
                error!(error = %e, "invalid API key provided");
                return Err(e);
            }
        };

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("mistral-assistant/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                error!(error = %e, "failed to create Mistral client");
                ClientInitError::Build(e)
            })?;

        Ok(Arc::new(MistralProvider::new(client, self.base_url.clone())))
    }
}

fn auth_headers(credential: &str) -> Result<HeaderMap, ClientInitError> {
    if credential.is_empty() || credential.chars().any(char::is_whitespace) {
        return Err(ClientInitError::InvalidCredential(
            "key must be non-empty and contain no whitespace".to_string(),
        ));
    }

    let mut value = HeaderValue::from_str(&format!("Bearer {credential}"))
        .map_err(|e| ClientInitError::InvalidCredential(e.to_string()))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}
