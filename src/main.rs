use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use profile_board::api::{self, AppState};
use profile_board::config::{Config, TrustedProxyMode};
use profile_board::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("profile_board=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("Loaded configuration");

    // Initialize storage
    let store = storage::connect(&config.database)
        .await
        .context("failed to open store")?;
    info!("Store initialized successfully");

    match config.identity.trusted_proxy_mode {
        TrustedProxyMode::None => {
            info!("🔓 Visitor identity = socket peer address (forwarding headers ignored)")
        }
        TrustedProxyMode::Standard => info!(
            "🔐 Visitor identity from Forwarded / X-Forwarded-For ({} trusted ranges, hop count {:?})",
            config.identity.trusted_proxies.len(),
            config.identity.num_trusted_proxies
        ),
        TrustedProxyMode::Cloudflare => info!("🔐 Visitor identity from CF-Connecting-IP"),
    }

    // Log frontend configuration
    if let Some(ref static_dir) = config.frontend.static_dir {
        info!("🎨 Serving frontend from directory: {}", static_dir);
    } else {
        info!("🎨 Serving embedded frontend");
    }

    let state = Arc::new(AppState::new(store, Arc::clone(&config)));
    let router = api::create_api_router(state);

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Profile page listening on http://{}", addr);
    info!("   - API endpoints available at http://{}/api/...", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}
