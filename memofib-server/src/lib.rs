pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod server;

// Re-export commonly used types
pub use backend::{BackendDescriptor, BackendModule, BackendRegistry, Factory, LoadError};
pub use cache::{Cache, CacheError, NopCache};
pub use config::ServerConfig;
pub use crate::core::{CancelPolicy, FibError, FibService, Outcome};
pub use server::{AppState, create_router};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{Span, debug, info};

/// Load the cache backend and wire up the shared request state
pub fn build_state(config: &ServerConfig, registry: &BackendRegistry) -> Result<AppState, LoadError> {
    let cache = backend::load(registry, &config.cache.backend, &Span::current())?;

    let fib = FibService::new(cache, config.cache.expiration)
        .with_policy(config.cache.cancellation)
        .with_deadline(config.server.request_timeout);

    Ok(AppState { fib })
}

/// Run the server until a shutdown signal arrives.
///
/// The backend is loaded before the listener is bound, so a broken backend
/// never accepts a connection.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!("application started");
    debug!(config = ?config, "using configuration");

    let state = build_state(&config, &BackendRegistry::builtin()).context("load cache backend")?;
    let app = create_router(state);

    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("listen on {}", addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!("application stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
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
                tracing::error!(error = %e, "cannot listen for SIGTERM");
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

    info!("shutdown signal received");
}
