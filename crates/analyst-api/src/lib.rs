//! Analyst API crate - axum HTTP server, route handlers and streamed replies.
//!
//! Provides the REST API for the business analyst assistant: session
//! management, streamed chat turns, BRD generation and export, one-shot
//! requirement analysis, health checks and the embedded chat page.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ui;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
