//! Integration tests for the drive-copilot retrieval pipeline.
//!
//! These tests exercise indexing, scoping, fusion, rendering and the HTTP
//! handlers without a running LLM: embeddings come from a keyword embedder
//! and the agent is driven by a scripted chat model.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, Request, StatusCode};
use axum::Json;
use parking_lot::Mutex;
use tower::ServiceExt;

use drive_copilot::api;
use drive_copilot::config::{Config, IndexScope};
use drive_copilot::llm::chat::ChatModel;
use drive_copilot::llm::embeddings::Embedder;
use drive_copilot::models::{
    ChatMessage, Chunk, DocumentRecord, IngestManifest, IngestRequest, RetrieveArgs,
    RetrieveRequest, SearchRequest,
};
use drive_copilot::search::engine::RetrievalEngine;
use drive_copilot::search::hybrid::FusionWeights;
use drive_copilot::search::render::{is_empty_context, parse_citations, NO_CONTEXT};
use drive_copilot::search::repository::{IndexHandle, IndexRepository};
use drive_copilot::state::AppState;

const DOC_A: &str = "root > docs > doc A.pdf";
const DOC_B: &str = "root > docs > doc B.pdf";
const VOCABULARY: [&str; 3] = ["revenue", "hiring", "budget"];

/// Embeds text as keyword counts over a tiny vocabulary.
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    VOCABULARY
        .iter()
        .map(|w| lower.matches(w).count() as f32 + 0.1)
        .collect()
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Replays canned replies in order.
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

fn record(id: &str, path: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        name: path.rsplit(" > ").next().unwrap().to_string(),
        path: path.to_string(),
    }
}

fn chunk(doc: &str, path: &str, idx: usize, content: &str) -> Chunk {
    Chunk {
        document_id: doc.to_string(),
        chunk_index: idx,
        path: path.to_string(),
        page_label: Some((idx + 1).to_string()),
        content: content.to_string(),
    }
}

/// doc A: chunks [0, 1, 2]; doc B: chunks [0, 1].
fn two_document_manifest() -> IngestManifest {
    IngestManifest {
        documents: vec![record("a", DOC_A), record("b", DOC_B)],
        chunks: vec![
            chunk("a", DOC_A, 0, "Revenue grew twelve percent in the third quarter."),
            chunk("a", DOC_A, 1, "The hiring budget was frozen for the quarter."),
            chunk("a", DOC_A, 2, "Revenue guidance for next year is unchanged."),
            chunk("b", DOC_B, 0, "Hiring plan: four engineers and one designer."),
            chunk("b", DOC_B, 1, "Revenue targets depend on the hiring plan."),
        ],
    }
}

fn build_handle(manifest: IngestManifest) -> IndexHandle {
    let embeddings = manifest
        .chunks
        .iter()
        .map(|c| keyword_vector(&c.content))
        .collect();
    IndexHandle::build("test", manifest.documents, manifest.chunks, embeddings, None).unwrap()
}

fn args(hint: Option<&str>, query: &str) -> RetrieveArgs {
    RetrieveArgs {
        hint: hint.map(str::to_string),
        is_folder: None,
        query: query.to_string(),
    }
}

fn engine() -> RetrievalEngine {
    RetrievalEngine::new(FusionWeights::default(), 2)
}

fn test_state(dir: &std::path::Path, scope: IndexScope, model: ScriptedModel) -> AppState {
    let config = Config {
        data_dir: dir.join("data"),
        source_dir: dir.join("files"),
        index_scope: scope,
        ..Config::default()
    };
    AppState::with_models(config, Arc::new(KeywordEmbedder), Arc::new(model)).unwrap()
}

#[test]
fn test_exact_paths_resolve_to_their_records() {
    let handle = build_handle(two_document_manifest());
    for r in handle.paths().records() {
        assert_eq!(handle.paths().resolve(Some(&r.path)).unwrap(), Some(r.id.clone()));
    }
}

#[test]
fn test_hint_doc_a_scopes_results_to_doc_a() {
    let handle = build_handle(two_document_manifest());
    assert_eq!(handle.paths().resolve(Some("doc A")).unwrap(), Some("a".to_string()));

    let query = "revenue hiring";
    let embedding = keyword_vector(query);
    let fused = engine()
        .retrieve_chunks(&handle, &args(Some("doc A"), query), Some(&embedding))
        .unwrap();
    assert!(!fused.is_empty());
    assert!(fused.iter().all(|f| f.chunk.document_id == "a"));
}

#[test]
fn test_unscoped_query_sees_both_documents() {
    let handle = build_handle(two_document_manifest());
    let query = "hiring plan engineers";
    let embedding = keyword_vector(query);
    let fused = RetrievalEngine::new(FusionWeights::default(), 5)
        .retrieve_chunks(&handle, &args(None, query), Some(&embedding))
        .unwrap();
    assert!(fused.iter().any(|f| f.chunk.document_id == "a"));
    assert!(fused.iter().any(|f| f.chunk.document_id == "b"));
}

#[test]
fn test_nonexistent_hint_falls_back_to_full_corpus() {
    let handle = build_handle(two_document_manifest());
    assert_eq!(handle.paths().resolve(Some("nonexistent.pdf")).unwrap(), None);

    let query = "revenue";
    let embedding = keyword_vector(query);
    let scoped_to_nothing = engine()
        .retrieve_chunks(&handle, &args(Some("nonexistent.pdf"), query), Some(&embedding))
        .unwrap();
    let unscoped = engine()
        .retrieve_chunks(&handle, &args(None, query), Some(&embedding))
        .unwrap();
    let keys = |v: &[drive_copilot::search::hybrid::FusedChunk]| {
        v.iter()
            .map(|f| (f.chunk.document_id.clone(), f.chunk.chunk_index))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&scoped_to_nothing), keys(&unscoped));
}

#[test]
fn test_empty_corpus_renders_explicit_no_context() {
    let handle = build_handle(IngestManifest::default());
    let ctx = engine()
        .retrieve(&handle, &args(Some("anything"), "revenue"), Some(&[1.0, 0.0, 0.0][..]))
        .unwrap();
    assert!(!ctx.is_empty());
    assert!(ctx.contains(NO_CONTEXT));
    assert!(is_empty_context(&ctx));
}

#[test]
fn test_fusion_deduplicates_and_is_deterministic() {
    let handle = build_handle(two_document_manifest());
    let query = "revenue";
    let embedding = keyword_vector(query);
    let first = engine()
        .retrieve(&handle, &args(None, query), Some(&embedding))
        .unwrap();

    let citations = parse_citations(&first);
    let mut keys: Vec<_> = citations.iter().map(|c| (c.path.clone(), c.chunk_index)).collect();
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);
    assert!(total <= 4);

    for _ in 0..5 {
        let again = engine()
            .retrieve(&handle, &args(None, query), Some(&embedding))
            .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_rendered_citations_roundtrip_to_chunks() {
    let handle = build_handle(two_document_manifest());
    let query = "hiring budget";
    let embedding = keyword_vector(query);
    let ctx = engine()
        .retrieve(&handle, &args(None, query), Some(&embedding))
        .unwrap();

    let citations = parse_citations(&ctx);
    assert!(!citations.is_empty());
    for citation in citations {
        let source = handle
            .chunks()
            .iter()
            .find(|c| c.path == citation.path && c.chunk_index == citation.chunk_index)
            .expect("citation points at an indexed chunk");
        assert_eq!(source.page_label.as_deref(), Some(citation.page_label.as_str()));
    }
}

#[test]
fn test_publish_and_reload_serves_same_results() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = two_document_manifest();
    let embeddings: Vec<Vec<f32>> = manifest.chunks.iter().map(|c| keyword_vector(&c.content)).collect();
    let query = "revenue";
    let embedding = keyword_vector(query);

    let before = {
        let repo = IndexRepository::new(dir.path(), IndexScope::Global).unwrap();
        repo.publish(None, manifest.documents, manifest.chunks, embeddings)
            .unwrap();
        let handle = repo.handle(None).unwrap();
        engine()
            .retrieve(&handle, &args(Some("doc B"), query), Some(&embedding))
            .unwrap()
    };

    let repo = IndexRepository::new(dir.path(), IndexScope::Global).unwrap();
    let handle = repo.handle(None).unwrap();
    let after = engine()
        .retrieve(&handle, &args(Some("doc B"), query), Some(&embedding))
        .unwrap();
    assert_eq!(before, after);
    assert!(parse_citations(&after).iter().all(|c| c.path == DOC_B));
}

#[tokio::test]
async fn test_retrieve_endpoint_before_and_after_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), IndexScope::Global, ScriptedModel::new(&[]));

    let request = || RetrieveRequest {
        args: args(Some("doc A"), "revenue"),
        scope_id: None,
    };

    let Json(empty) = api::search::retrieve(State(state.clone()), Json(request()))
        .await
        .unwrap();
    assert!(is_empty_context(&empty.context));

    let Json(ingested) = api::ingest::ingest(
        State(state.clone()),
        Json(IngestRequest {
            scope_id: None,
            manifest: Some(two_document_manifest()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(ingested.status, "completed");
    assert_eq!(ingested.documents, 2);
    assert_eq!(ingested.chunks, 5);

    let Json(found) = api::search::retrieve(State(state.clone()), Json(request()))
        .await
        .unwrap();
    let citations = parse_citations(&found.context);
    assert!(!citations.is_empty());
    assert!(citations.iter().all(|c| c.path == DOC_A));

    let Json(status) = api::ingest::ingestion_status(
        State(state),
        Query(api::ingest::StatusQuery::default()),
    )
    .await
    .unwrap();
    assert!(status.ingestion_status);
    assert_eq!(status.files, vec![DOC_A.to_string(), DOC_B.to_string()]);
}

#[tokio::test]
async fn test_retrieve_endpoint_rejects_empty_query() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), IndexScope::Global, ScriptedModel::new(&[]));
    let err = api::search::retrieve(
        State(state),
        Json(RetrieveRequest {
            args: args(None, "   "),
            scope_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_endpoint_runs_agent_with_citations() {
    let dir = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(&[
        r#"{"tool": "context_retriever", "args": {"hint": "doc B", "is_folder": false, "query": "hiring plan"}}"#,
        r#"{"final_answer": "Four engineers <cite>(root > docs > doc B.pdf, 1, 0)</cite>"}"#,
    ]);
    let state = test_state(dir.path(), IndexScope::PerUser, model);

    api::ingest::ingest(
        State(state.clone()),
        Json(IngestRequest {
            scope_id: Some("alice".to_string()),
            manifest: Some(two_document_manifest()),
        }),
    )
    .await
    .unwrap();

    let Json(resp) = api::search::search(
        State(state),
        Json(SearchRequest {
            query: "What is the hiring plan in doc B?".to_string(),
            document_name: None,
            scope_id: Some("alice".to_string()),
        }),
    )
    .await
    .unwrap();
    assert!(resp.response.contains("<cite>(root > docs > doc B.pdf, 1, 0)</cite>"));
}

#[tokio::test]
async fn test_per_user_ingest_requires_scope_id() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), IndexScope::PerUser, ScriptedModel::new(&[]));
    let err = api::ingest::ingest(
        State(state),
        Json(IngestRequest {
            scope_id: None,
            manifest: Some(two_document_manifest()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_ingest_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), IndexScope::Global, ScriptedModel::new(&[]));
    let _running = state.ingest_lock.clone().lock_owned().await;

    let err = api::ingest::ingest(
        State(state.clone()),
        Json(IngestRequest {
            scope_id: None,
            manifest: Some(two_document_manifest()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_hello() {
    assert_eq!(api::ingest::hello().await, "hello");
}

async fn get_through_router(
    app: axum::Router,
    uri: &str,
    origin: &str,
) -> axum::http::Response<axum::body::Body> {
    let request = Request::builder()
        .uri(uri)
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_extension_status_path_is_routed() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), IndexScope::Global, ScriptedModel::new(&[]));
    api::ingest::ingest(
        State(state.clone()),
        Json(IngestRequest {
            scope_id: None,
            manifest: Some(two_document_manifest()),
        }),
    )
    .await
    .unwrap();

    let response =
        get_through_router(api::router(state), "/ingestion_status", "chrome-extension://abc").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["ingestion_status"], true);
    assert_eq!(status["files"], serde_json::json!([DOC_A, DOC_B]));
}

#[tokio::test]
async fn test_cors_limited_to_configured_origins() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("data"),
        cors_origins: vec!["chrome-extension://abc".to_string()],
        ..Config::default()
    };
    let state = AppState::with_models(
        config,
        Arc::new(KeywordEmbedder),
        Arc::new(ScriptedModel::new(&[])),
    )
    .unwrap();

    let allowed =
        get_through_router(api::router(state.clone()), "/hello", "chrome-extension://abc").await;
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "chrome-extension://abc"
    );

    let other = get_through_router(api::router(state), "/hello", "https://evil.example").await;
    assert!(other
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
