//! Verifier API server - validate, harden and run workflows over HTTP.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use verifier::io::config::{DEFAULT_CONFIG_PATH, load_config};
use verifier::logging;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "verifier-api")]
#[command(about = "HTTP service for validating, hardening and running workflows")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3002")]
    port: u16,

    /// Project directory; steps run here and relative paths resolve here
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Config file, relative to the project directory
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn,verifier=info,verifier_api=info");

    let args = Args::parse();

    let project_dir = args.project_dir.canonicalize().unwrap_or(args.project_dir);
    let config = load_config(&project_dir.join(&args.config))
        .with_context(|| format!("load config {}", args.config.display()))?;
    info!(project_dir = %project_dir.display(), "starting verifier-api");

    let state = AppState::new(project_dir, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = wait_for_signal().await {
        warn!(err = %err, "signal handler failed; shutting down");
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
