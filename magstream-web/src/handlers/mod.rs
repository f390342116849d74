//! HTTP request handlers organized by functionality

pub mod api;
pub mod video;

use serde::Deserialize;

// Re-export handler functions
pub use api::{add_session, list_sessions, shutdown};
pub use video::stream_video;

use crate::errors::ApiError;

/// Query string shared by `/add` and `/video`.
#[derive(Debug, Default, Deserialize)]
pub struct MagnetQuery {
    pub magnet_link: Option<String>,
}

impl MagnetQuery {
    /// The magnet link, rejecting an absent or blank parameter.
    pub fn magnet_link(&self) -> Result<&str, ApiError> {
        self.magnet_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .ok_or_else(ApiError::missing_magnet)
    }
}
