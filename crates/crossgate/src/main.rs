//! # Crossgate - Cross-Domain Session Relay
//!
//! Propagates Manager login/logout session state across multiple domains
//! using short-lived signed tokens and a redirect chain driven entirely by
//! the browser - no server-to-server calls.
//!
//! ## Architecture
//! ```text
//! Host app → /hooks/* → RunPlanner → RunStore (Redis)
//! Browser  → /_ms-run (home) ⇄ /_ms-sso (each target)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod chain;
mod config;
mod directory;
mod plan;
mod routes;
mod runs;
mod secret;
mod session;
mod state;
mod token;

use config::AppConfig;
use state::AppState;

/// Crossgate - cross-domain session relay
#[derive(Parser, Debug)]
#[command(name = "crossgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/crossgate.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Shared signing secret (overrides config)
    #[arg(long, env = "CROSSGATE_SSO_SECRET", hide_env_values = true)]
    sso_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!(
        "🔗 Starting Crossgate v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!("📋 Configuration loaded from {}", args.config);

    // Initialize application state (secret resolution, stores, registry)
    let state = AppState::new(config.clone()).await?;
    if state.redis.is_some() {
        info!("✅ Redis connected: {}", config.redis_url);
    }

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("🚀 Crossgate listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("🛑 Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Crossgate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
