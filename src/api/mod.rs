pub mod ingest;
pub mod search;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the axum router with all routes, including the unprefixed paths the
/// browser extension calls.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/hello", get(ingest::hello))
        .route("/search", post(search::search))
        .route("/ingestion_status", get(ingest::ingestion_status))
        .route("/api/search", post(search::search))
        .route("/api/retrieve", post(search::retrieve))
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/ingestion_status", get(ingest::ingestion_status))
        .layer(cors)
        .with_state(state)
}

/// CORS for the extension popup. No configured origins means any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}
