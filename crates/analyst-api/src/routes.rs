//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression and body
//! limits. Streaming routes are kept out of the compression layer so chunks
//! reach the client as they are produced.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use analyst_core::error::AnalystError;

use crate::handlers;
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Create the axum Router with all routes and middleware.
///
/// # Arguments
/// * `state` - The shared application state.
///
/// # Returns
/// A fully configured axum Router ready to serve requests.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.server.body_limit_bytes;

    let json_routes = Router::new()
        .route("/", get(handlers::ui))
        .route("/health", get(handlers::health))
        .route("/session/new", post(handlers::create_session))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/session/{id}",
            get(handlers::get_session)
                .patch(handlers::rename_session)
                .delete(handlers::delete_session),
        )
        .route("/session/{id}/reset", post(handlers::reset_session))
        .route("/export_brd/{id}", get(handlers::export_brd))
        .route("/analyze", post(handlers::analyze))
        .layer(CompressionLayer::new());

    // Plain-text streams, uncompressed.
    let stream_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/generate_brd/{id}", post(handlers::generate_brd));

    json_routes
        .merge(stream_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on the configured address until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), AnalystError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let router = create_router(state);

    tracing::info!("Starting API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AnalystError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AnalystError::Api(format!("Server error: {}", e)))?;

    tracing::info!("API server stopped");
    Ok(())
}
