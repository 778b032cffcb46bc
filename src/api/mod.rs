//! API layer -- axum routes, handlers, and middleware.

mod error;
mod routes;
pub mod state;

pub use self::error::ApiError;

use self::state::AppState;
use crate::config::ServerConfig;
use crate::storage::artifacts::PUBLIC_PREFIX;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the application router with all API routes and the static
/// screenshot tree.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let screenshots = ServeDir::new(&state.artifact_root);

    let app = Router::new()
        .nest("/api", routes::api_routes())
        .nest_service(PUBLIC_PREFIX, screenshots)
        .fallback(fallback)
        .with_state(state)
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(TraceLayer::new_for_http());

    if server.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn fallback() -> ApiError {
    ApiError::NotFound("not found".to_string())
}
