use anyhow::{Context, Result};
use clap::Parser;
use faqgate::app::{router, AppState};
use faqgate::config::{ServiceConfig, API_KEY_ENV};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "faqgate")]
#[command(about = "FAQ answering endpoint guarded by a token-bucket admission gate")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "faqgate.toml")]
    config: PathBuf,

    /// Address to listen on (overrides server.bind)
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let state = AppState::from_config(&config, std::env::var(API_KEY_ENV).ok())
        .context("refusing to start")?;
    let bind = cli.bind.unwrap_or(config.server.bind);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    tracing::info!(%bind, mode = ?state.answer_mode(), "faqgate listening");

    axum::serve(listener, router(state)).await.context("server error")?;
    Ok(())
}
