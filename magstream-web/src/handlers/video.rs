//! Video streaming handler

use axum::body::Body;
use axum::extract::{OriginalUri, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use magstream_core::SessionError;
use magstream_core::streaming::{
    AttachedStream, ByteMeter, ServingMonitor, meter_stream, parse_range_header,
};
use tracing::debug;

use super::MagnetQuery;
use crate::errors::ApiError;
use crate::server::AppState;

const DLNA_TRANSFER_MODE: &str = "transferMode.dlna.org";
const DLNA_CONTENT_FEATURES: &str = "contentFeatures.dlna.org";
const DLNA_STREAMING_FEATURES: &str =
    "DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000";

/// `GET /video` - streams the main file of the session, honouring a single
/// `Range` request.
///
/// The connection stays attached until the response body is dropped, so a
/// client that goes away mid-transfer detaches exactly like one that reads
/// to the end. While metadata is pending the client is redirected back to
/// the same URI after a short delay.
pub async fn stream_video(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<MagnetQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = state.registry.get_or_create(query.magnet_link()?)?;
    let connection = session.attach();

    let main_file = match session.playback().await?.into_main_file() {
        Ok(file) => file,
        Err(SessionError::NotYetReady) => {
            debug!("{}: metadata pending, asking client to retry", session.display_name());
            tokio::time::sleep(state.config().streaming.not_ready_retry_delay).await;
            drop(connection);
            return Ok(Redirect::temporary(&uri.to_string()).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let range = match headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => parse_range_header(value, main_file.length)?,
        None => None,
    };
    debug!(
        "{}: streaming {} ({:?})",
        session.display_name(),
        main_file.path,
        range
    );

    let stream = session.open_stream(range).await?;
    let meter = ByteMeter::new();
    let streaming = &state.config().streaming;
    let monitor = ServingMonitor::spawn(
        meter.clone(),
        streaming.serving_threshold_bytes,
        streaming.serving_window,
        session.clone(),
    );
    let body = Body::from_stream(AttachedStream::new(
        meter_stream(stream, meter),
        connection,
        Some(monitor),
    ));

    let content_type = mime_guess::from_path(main_file.name()).first_or_octet_stream();
    let builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(DLNA_TRANSFER_MODE, "Streaming")
        .header(DLNA_CONTENT_FEATURES, DLNA_STREAMING_FEATURES);
    let builder = match range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_LENGTH, range.len())
            .header(header::CONTENT_RANGE, range.content_range(main_file.length)),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, main_file.length),
    };

    builder.body(body).map_err(|e| ApiError::Internal {
        reason: e.to_string(),
    })
}
