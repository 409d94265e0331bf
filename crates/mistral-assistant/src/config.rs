use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, warn};

/// Environment variable selecting the deployment bind mode.
pub const DEPLOY_MODE_ENV_VAR: &str = "ASSISTANT_DEPLOY_MODE";

/// Model requested from the completion endpoint unless overridden in the config file.
pub const DEFAULT_MODEL: &str = "codestral-mamba-latest";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Resolved from the environment, never from the file.
    #[serde(skip)]
    pub deploy_mode: DeployMode,
    /// Resolved from the environment, never from the file.
    #[serde(skip)]
    pub credential: Option<String>,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Overlay the process environment onto a loaded config.
    ///
    /// `lookup` is `std::env::var` in production. A missing credential is only
    /// warned about here; it becomes an error when the credential is first used.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(DEPLOY_MODE_ENV_VAR) {
            self.deploy_mode = mode.parse()?;
        }

        self.credential = lookup(&self.llm.api_key_env).filter(|v| !v.trim().is_empty());
        if self.credential.is_none() {
            warn!(
                var = %self.llm.api_key_env,
                "credential not set; chat requests will fail until it is provided"
            );
        }
        Ok(())
    }

    /// The (host, port) pair to bind. Explicit server settings win over the deploy mode.
    pub fn bind_address(&self) -> (String, u16) {
        let (host, port) = self.deploy_mode.bind_address();
        (
            self.server.host.clone().unwrap_or_else(|| host.to_string()),
            self.server.port.unwrap_or(port),
        )
    }

    pub fn credential_provider(&self) -> CredentialProvider {
        CredentialProvider::new(self.llm.api_key_env.clone(), self.credential.clone())
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Overrides the deploy mode host when set.
    #[serde(default)]
    pub host: Option<String>,
    /// Overrides the deploy mode port when set.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_seconds: u64,
    /// Upper bound on live sessions; the least recently used goes first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            request_timeout_seconds: default_request_timeout(),
            session_idle_timeout_seconds: default_session_idle_timeout(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

fn default_session_idle_timeout() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    1000
}

// ============================================================================
// LlmConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_client_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

fn default_client_timeout() -> u64 {
    60
}

// ============================================================================
// DeployMode
// ============================================================================

/// Where the UI server is expected to run. Each mode maps to a fixed bind address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    /// Loopback on an ephemeral port.
    #[default]
    Development,
    Container,
    Production,
}

impl DeployMode {
    pub fn bind_address(self) -> (&'static str, u16) {
        match self {
            DeployMode::Development => ("127.0.0.1", 0),
            DeployMode::Container => ("0.0.0.0", 7860),
            DeployMode::Production => ("0.0.0.0", 8080),
        }
    }
}

impl FromStr for DeployMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeployMode::Development),
            "container" => Ok(DeployMode::Container),
            "production" | "prod" => Ok(DeployMode::Production),
            _ => Err(ConfigError::UnknownDeployMode(s.to_string())),
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployMode::Development => write!(f, "development"),
            DeployMode::Container => write!(f, "container"),
            DeployMode::Production => write!(f, "production"),
        }
    }
}

// ============================================================================
// CredentialProvider
// ============================================================================

/// Hands out the API key resolved at startup.
#[derive(Clone)]
pub struct CredentialProvider {
    var: String,
    value: Option<String>,
}

impl CredentialProvider {
    pub fn new(var: impl Into<String>, value: Option<String>) -> Self {
        Self {
            var: var.into(),
            value,
        }
    }

    pub fn get_credential(&self) -> Result<String, ConfigError> {
        match self.value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => {
                error!(var = %self.var, "credential environment variable not found");
                Err(ConfigError::MissingCredential {
                    var: self.var.clone(),
                })
            }
        }
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("var", &self.var)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("API key not found, set the {var} environment variable")]
    MissingCredential { var: String },

    #[error("unknown deploy mode '{0}' (expected development, container or production)")]
    UnknownDeployMode(String),
}

// ============================================================================
// Tests
// ============================================================================
