use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use mistral_assistant::llm::MistralClientFactory;
use mistral_assistant::server::{self, AppState};
use mistral_assistant::session::SessionStore;
use mistral_assistant::{Config, TurnExchange, logging};

#[derive(Parser)]
#[command(name = "mistral-assistant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML config file; a missing file means defaults.
    #[arg(short, long, default_value = "assistant.yaml")]
    config: PathBuf,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if cli.host.is_some() {
        config.server.host = cli.host;
    }
    if cli.port.is_some() {
        config.server.port = cli.port;
    }

    let factory = MistralClientFactory::new(
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_seconds),
    );
    let exchange = TurnExchange::new(
        config.credential_provider(),
        Arc::new(factory),
        config.llm.model.clone(),
    );
    info!(model = %exchange.model(), mode = %config.deploy_mode, "starting assistant");

    let sessions = SessionStore::with_limits(
        Duration::from_secs(config.server.session_idle_timeout_seconds),
        config.server.max_sessions,
    );
    let app = server::build_app(
        AppState::new(exchange, sessions),
        config.server.request_timeout_seconds,
    );

    let (host, port) = config.bind_address();
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;

    server::serve(listener, app).await?;
    Ok(())
}
