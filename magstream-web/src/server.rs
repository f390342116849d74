//! HTTP server for Magstream
//!
//! Wires the session registry into an axum router and runs it until
//! `/shutdown` is requested or the process receives Ctrl-C.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use magstream_core::config::MagstreamConfig;
use magstream_core::{SessionRegistry, SwarmEngineFactory};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::ServerError;
use crate::handlers::{add_session, list_sessions, shutdown, stream_video};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    /// Signalled once every session has been destroyed by `/shutdown`.
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &MagstreamConfig {
        self.registry.config()
    }
}

/// Builds the router serving every Magstream endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/add", get(add_session))
        .route("/video", get(stream_video))
        .route("/shutdown", get(shutdown))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the streaming server until shutdown.
///
/// Returns only after every session has been destroyed.
///
/// # Errors
/// - `ServerError::Bind` - Listen address unavailable
/// - `ServerError::Serve` - Listener failed while serving
pub async fn run_server(
    config: MagstreamConfig,
    factory: Arc<dyn SwarmEngineFactory>,
) -> Result<(), ServerError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let registry = SessionRegistry::new(config, factory);
    let state = AppState::new(registry.clone());
    let app = router(state.clone());

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    info!("Magstream streaming server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    // No-op when the shutdown route already destroyed everything
    registry.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Resolves once the server should stop accepting connections.
///
/// On Ctrl-C the sessions are destroyed first, which ends any open video
/// bodies so graceful shutdown does not wait on them.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, destroying all sessions");
                state.registry.shutdown().await;
            }
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = state.shutdown.notified() => {
            info!("Shutdown requested");
        }
    }
}
