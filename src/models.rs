use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexed document: the unit a file/folder hint resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    /// Human-readable ancestry chain, e.g. `root > Finance > Q3_report.pdf`.
    pub path: String,
}

/// A bounded span of a document's linearized text; the unit of indexing and citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Position within the owning document, contiguous from 0.
    pub chunk_index: usize,
    pub path: String,
    #[serde(default)]
    pub page_label: Option<String>,
    pub content: String,
}

impl Chunk {
    /// Fusion identity of a chunk.
    pub fn key(&self) -> (&str, usize) {
        (self.document_id.as_str(), self.chunk_index)
    }
}

/// Which leg of the hybrid retriever produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalLeg {
    Semantic,
    Lexical,
}

/// A single ranked candidate from one leg.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
    pub source_leg: RetrievalLeg,
}

/// Chunk Store handed over by an external parser/ingestion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestManifest {
    pub documents: Vec<DocumentRecord>,
    pub chunks: Vec<Chunk>,
}

/// Arguments of the `context_retriever` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveArgs {
    #[serde(default)]
    pub hint: Option<String>,
    /// Accepted for compatibility; scoping is decided by the resolved document id alone.
    #[serde(default)]
    pub is_folder: Option<bool>,
    pub query: String,
}

/// Search request (`POST /search`)
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Document the user explicitly selected in the extension, if any.
    #[serde(default)]
    pub document_name: Option<String>,
    /// Session/user identifier used to pick the index when scope is per-user.
    #[serde(default)]
    pub scope_id: Option<String>,
}

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub response: String,
}

/// Raw retrieval request (`POST /api/retrieve`)
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveRequest {
    #[serde(flatten)]
    pub args: RetrieveArgs,
    #[serde(default)]
    pub scope_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
    pub context: String,
}

/// Ingest request (`POST /api/ingest`). Without a manifest the configured
/// local source directory is ingested.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub manifest: Option<IngestManifest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub generation: String,
    pub documents: usize,
    pub chunks: usize,
}

/// Metadata written next to every published index generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub generation: String,
    pub built_at: DateTime<Utc>,
    pub document_count: usize,
    pub chunk_count: usize,
    /// Dimension of the stored chunk embeddings; queries must match it.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionStatus {
    pub ingestion_status: bool,
    pub generation: Option<GenerationInfo>,
    pub files: Vec<String>,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
