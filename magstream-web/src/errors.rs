//! Error types for the HTTP layer and their status code mapping.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use magstream_core::{
    MagstreamError, RegistryError, SessionError, StreamingError, TorrentError,
};
use serde::Serialize;

use crate::json::PrettyJson;

/// Failure of a single request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] MagstreamError),

    #[error("Failed to build response: {reason}")]
    Internal { reason: String },
}

impl ApiError {
    /// The `magnet_link` query parameter was absent or empty.
    pub fn missing_magnet() -> Self {
        ApiError::Core(MagstreamError::Torrent(TorrentError::InvalidMagnetLink {
            reason: "Missing 'magnet_link' parameter".to_string(),
        }))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(error) => match error {
                MagstreamError::Torrent(_) => StatusCode::BAD_REQUEST,
                MagstreamError::Streaming(StreamingError::RangeUnsatisfiable { .. }) => {
                    StatusCode::RANGE_NOT_SATISFIABLE
                }
                MagstreamError::Streaming(StreamingError::NotFound)
                | MagstreamError::Session(SessionError::MetadataTimeout) => StatusCode::NOT_FOUND,
                MagstreamError::Streaming(StreamingError::NotYetReady)
                | MagstreamError::Session(SessionError::NotYetReady)
                | MagstreamError::Streaming(StreamingError::Session(SessionError::Destroyed))
                | MagstreamError::Session(SessionError::Destroyed)
                | MagstreamError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        ApiError::Core(error.into())
    }
}

impl From<StreamingError> for ApiError {
    fn from(error: StreamingError) -> Self {
        ApiError::Core(error.into())
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        ApiError::Core(MagstreamError::Streaming(error.into()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Core(error) => error.user_message(),
            ApiError::Internal { .. } => "Internal server error".to_string(),
        };
        if status.is_server_error() {
            tracing::warn!("Request failed with {}: {}", status, self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        let mut response = (status, PrettyJson(ErrorBody { error: message })).into_response();
        if let ApiError::Core(MagstreamError::Streaming(StreamingError::RangeUnsatisfiable {
            length,
        })) = self
        {
            if let Ok(value) = format!("bytes */{length}").parse() {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

/// Failure to run the HTTP server itself.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::missing_magnet(), StatusCode::BAD_REQUEST),
            (
                StreamingError::RangeUnsatisfiable { length: 10 }.into(),
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
            (SessionError::MetadataTimeout.into(), StatusCode::NOT_FOUND),
            (SessionError::NotYetReady.into(), StatusCode::SERVICE_UNAVAILABLE),
            (SessionError::Destroyed.into(), StatusCode::SERVICE_UNAVAILABLE),
            (RegistryError::ShuttingDown.into(), StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_unsatisfiable_range_reports_length() {
        let response =
            ApiError::from(StreamingError::RangeUnsatisfiable { length: 1000 }).into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }
}
