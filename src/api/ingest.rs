use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::RetrievalError;
use crate::ingest::{run_ingestion, IngestSource};
use crate::models::{IngestRequest, IngestResponse, IngestionStatus};
use crate::state::AppState;

/// GET /hello
pub async fn hello() -> &'static str {
    "hello"
}

/// POST /api/ingest - Rebuild and publish the scope's index.
///
/// With a manifest the supplied chunks are indexed as-is; without one the
/// configured source directory is walked and chunked. Queries keep using the
/// previous snapshot until the new one is published.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, (StatusCode, String)> {
    // Validate the scope before taking the lock
    state
        .repository
        .scope_key(req.scope_id.as_deref())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let Ok(_guard) = state.ingest_lock.try_lock() else {
        return Err((
            StatusCode::CONFLICT,
            "An ingestion is already running".to_string(),
        ));
    };

    let source = match req.manifest {
        Some(manifest) => IngestSource::Manifest(manifest),
        None => IngestSource::LocalDir(state.config.source_dir.clone()),
    };

    let info = run_ingestion(
        state.repository.clone(),
        state.embedder.as_ref(),
        &state.config.chunking,
        req.scope_id.clone(),
        source,
    )
    .await
    .map_err(|e| {
        tracing::error!("Ingestion failed: {e:#}");
        match e.downcast_ref::<RetrievalError>() {
            Some(RetrievalError::IndexUnavailable(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Ingestion failed: {e:#}"),
            ),
        }
    })?;

    Ok(Json(IngestResponse {
        status: "completed".to_string(),
        generation: info.generation,
        documents: info.document_count,
        chunks: info.chunk_count,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub scope_id: Option<String>,
}

/// GET /api/ingestion_status, GET /ingestion_status
pub async fn ingestion_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<IngestionStatus>, (StatusCode, String)> {
    let status = state
        .repository
        .clone()
        .load_status(query.scope_id)
        .await
        .map_err(|e| {
            tracing::error!("Status lookup failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(status))
}
