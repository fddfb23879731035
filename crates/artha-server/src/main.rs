use anyhow::Result;
use clap::Parser;

use artha::config::{default_config_path, ResolvedConfig};

#[derive(Parser)]
#[command(name = "artha-server", about = "HTTP API for the artha agent")]
struct Cli {
    /// Path to artha.toml. Defaults to ./artha.toml, then the XDG data directory.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Overrides the configured port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load_or_default(&config_path)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let state = artha_server::build(&config)?;
    let app = artha_server::router(state, &config.cors_origins);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "artha-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
