use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use dbbrowser::{create_router, AppState, DefaultDriver, RouterConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dbbrowser")]
#[command(about = "DBBrowser - relay browser database sessions to MySQL, PostgreSQL and MongoDB", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, env = "DBBROWSER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "DBBROWSER_PORT", default_value_t = 8080)]
    port: u16,

    /// Path of the WebSocket endpoint
    #[arg(long, env = "DBBROWSER_WS_PATH", default_value = "/ws")]
    ws_path: String,

    /// Allowed browser origin (any origin when omitted)
    #[arg(long, env = "DBBROWSER_ALLOW_ORIGIN")]
    allow_origin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbbrowser=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let allow_origin = args
        .allow_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("invalid --allow-origin value")?;

    let ws_path = if args.ws_path.starts_with('/') {
        args.ws_path.clone()
    } else {
        format!("/{}", args.ws_path)
    };

    let config = RouterConfig {
        ws_path,
        allow_origin,
    };
    let app = create_router(AppState::new(Arc::new(DefaultDriver)), &config);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {} (WebSocket at {})", addr, config.ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing sessions");
}
