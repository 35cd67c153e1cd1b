//! Entry point for the `vigil-gateway` HTTP server.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_core::EngineConfig;
use vigil_gateway::{create_router, AppState};

fn load_config() -> Result<EngineConfig, vigil_core::CoreError> {
    match std::env::var_os("VIGIL_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            info!(path = %path.display(), "loading engine configuration");
            EngineConfig::from_path(&path)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid engine configuration");
            std::process::exit(1);
        }
    };

    let addr = std::env::var("VIGIL_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3457".to_owned());
    let app = create_router(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "vigil-gateway listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
