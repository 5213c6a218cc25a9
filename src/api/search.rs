use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::error::RetrievalError;
use crate::llm::agent::{Agent, ScopedRetrieval};
use crate::models::{RetrieveRequest, RetrieveResponse, SearchRequest, SearchResponse};
use crate::state::AppState;

/// POST /search, POST /api/search - Agent-backed question answering:
///   1. The agent extracts a file/folder hint and a cleaned query
///   2. It calls the retrieval tool (hint resolution, scoped hybrid search)
///   3. It answers from the rendered context, citing each source
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let scope_id = req.scope_id.as_deref();

    let _permit = state.chat_semaphore.acquire().await.map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Chat capacity unavailable".to_string(),
        )
    })?;

    let files = state
        .repository
        .clone()
        .load_status(req.scope_id.clone())
        .await
        .map_err(|e| {
            tracing::error!("Status lookup failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?
        .files;
    let tool = ScopedRetrieval {
        service: &state.retrieval,
        scope_id,
    };
    let agent = Agent::new(state.chat_model.as_ref(), &tool);

    let answer = agent
        .answer(&query, req.document_name.as_deref(), &files)
        .await
        .map_err(|e| {
            if let Some(retrieval) = e.downcast_ref::<RetrievalError>() {
                tracing::error!("Search aborted: {retrieval}");
                (StatusCode::SERVICE_UNAVAILABLE, retrieval.to_string())
            } else {
                tracing::error!("Agent failed: {e:#}");
                (StatusCode::BAD_GATEWAY, format!("LLM error: {e}"))
            }
        })?;

    tracing::info!(
        "Answered with {} retrieval call(s)",
        answer.tool_calls.len()
    );
    Ok(Json(SearchResponse {
        response: answer.answer,
    }))
}

/// POST /api/retrieve - The retrieval tool on its own; returns the rendered context.
pub async fn retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, String)> {
    if req.args.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let context = state
        .retrieval
        .retrieve(req.scope_id.as_deref(), req.args)
        .await
        .map_err(|e| {
            tracing::error!("Retrieval failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?;

    Ok(Json(RetrieveResponse { context }))
}
