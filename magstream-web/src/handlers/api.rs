//! JSON API handlers for session management

use axum::extract::{Query, State};
use magstream_core::SessionSnapshot;
use serde::Serialize;
use tracing::info;

use super::MagnetQuery;
use crate::errors::ApiError;
use crate::json::PrettyJson;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ShutdownReport {
    pub destroyed: usize,
}

/// `GET /` - status of every live session.
pub async fn list_sessions(State(state): State<AppState>) -> PrettyJson<Vec<SessionSnapshot>> {
    PrettyJson(state.registry.list().await)
}

/// `GET /add` - starts the session for a magnet link if needed and reports
/// its status. The request counts as a connection while it is answered.
pub async fn add_session(
    State(state): State<AppState>,
    Query(query): Query<MagnetQuery>,
) -> Result<PrettyJson<SessionSnapshot>, ApiError> {
    let session = state.registry.get_or_create(query.magnet_link()?)?;
    let _connection = session.attach();

    Ok(PrettyJson(session.snapshot().await?))
}

/// `GET /shutdown` - destroys every session, then stops the server.
pub async fn shutdown(State(state): State<AppState>) -> PrettyJson<ShutdownReport> {
    info!("Shutdown requested over HTTP");
    let destroyed = state.registry.shutdown().await;
    state.shutdown.notify_one();

    PrettyJson(ShutdownReport { destroyed })
}
