//! Magstream Web - HTTP streaming server
//!
//! Serves the main file of a torrent session as a seekable video stream and
//! reports session status as JSON. Sessions are resolved through the core
//! `SessionRegistry`; every request holds a connection on its session for
//! as long as the exchange lasts.

pub mod errors;
pub mod handlers;
pub mod json;
pub mod server;

// Re-export main types
pub use errors::{ApiError, ServerError};
pub use server::{AppState, router, run_server};
