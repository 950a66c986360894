// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use forward_oidc::config::AppConfig;
use forward_oidc::provider::Provider;
use forward_oidc::server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Lightweight OpenID Connect provider backed by a forward-auth session check.
#[derive(Debug, Parser)]
#[command(name = "forward-oidc", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "/data/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    init_tracing(config.log_level());

    let provider = Provider::new(config.oidc.clone()).context("failed to initialise the OIDC provider")?;
    let provider = Arc::new(provider);
    let sweeper = provider.start_background_tasks();

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let router = server::create_router(provider);

    server::serve(listener, router, shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("OIDC provider stopped.");
    Ok(())
}

/// Initialize tracing; `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}
