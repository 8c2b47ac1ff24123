//! pos-server binary: load config, open the database, serve until signalled.

use std::path::PathBuf;

use anyhow::Context;
use tavola_db::{Database, ServiceContext};
use tavola_pos_server::{router, AppState, ServerConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Optional config file: first argument, else TAVOLA_CONFIG.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TAVOLA_CONFIG").ok())
        .map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref()).context("loading configuration")?;

    info!(
        bind = %config.bind_address,
        database = %config.database_path.display(),
        "Starting Tavola POS server"
    );

    let db = Database::new(config.db_config())
        .await
        .context("opening database")?;
    let ctx = ServiceContext::new(db.clone()).with_settings(config.engine_settings());
    let app = router(AppState::new(ctx));

    let listener = TcpListener::bind(config.socket_addr()?)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    db.close().await;
    info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` if set, otherwise debug for our crates and quiet sqlx.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tavola=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
