//! Clarify API crate - axum HTTP server and WebSocket sessions.
//!
//! Every WebSocket connection gets its own conversation worker; the
//! registry in [`AppState`] maps session ids to those workers.

pub mod error;
pub mod frames;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use registry::{SessionRegistry, SessionStatus};
pub use routes::{create_router, start_server};
pub use state::AppState;
