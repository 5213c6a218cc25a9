//! Hybrid Retrieval Engine: `retrieve(hint, is_folder, cleaned_query)`.
//!
//! ```text
//! hint ──► PathIndex::resolve ──► document_id?
//!                                     │
//!                    build_retrievers(handle, document_id, k)
//!                         │                         │
//!                  semantic (cosine)          lexical (BM25)
//!                         └──────── fuse ───────────┘
//!                                     │
//!                              render_context
//! ```

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::llm::chat::sanitize_for_prompt;
use crate::llm::embeddings::Embedder;
use crate::models::RetrieveArgs;
use crate::search::hybrid::{fuse, FusedChunk, FusionWeights};
use crate::search::render::render_context;
use crate::search::repository::{IndexHandle, IndexRepository};
use crate::search::scope::{build_retrievers, RetrievalQuery};

/// Longest hint passed to the path resolver, in characters.
const MAX_HINT_CHARS: usize = 256;
/// Longest query passed to either leg, in characters.
const MAX_QUERY_CHARS: usize = 2_000;

/// Stateless query-time pipeline over one index snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalEngine {
    weights: FusionWeights,
    top_k_per_leg: usize,
}

impl RetrievalEngine {
    pub fn new(weights: FusionWeights, top_k_per_leg: usize) -> Self {
        Self {
            weights,
            top_k_per_leg: top_k_per_leg.max(1),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self::new(config.weights()?, config.top_k_per_leg))
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Resolve, scope, fuse. Returns the fused chunks in rank order.
    pub fn retrieve_chunks(
        &self,
        handle: &IndexHandle,
        args: &RetrieveArgs,
        query_embedding: Option<&[f32]>,
    ) -> Result<Vec<FusedChunk>> {
        let query = clean_input(&args.query, MAX_QUERY_CHARS);
        if query.is_empty() {
            tracing::info!("Empty query after cleaning; nothing to retrieve");
            return Ok(Vec::new());
        }
        let hint = args
            .hint
            .as_deref()
            .map(|h| clean_input(h, MAX_HINT_CHARS))
            .filter(|h| !h.is_empty());

        let document_id = handle.paths().resolve(hint.as_deref())?;
        match (&hint, &document_id) {
            (Some(h), Some(id)) => tracing::info!("Hint '{h}' resolved to {id}"),
            (Some(h), None) => tracing::info!("Hint '{h}' matched nothing; searching all documents"),
            _ => {}
        }
        if args.is_folder == Some(true) {
            tracing::debug!("Folder hint; scoping to the single resolved document");
        }

        let (semantic, lexical) =
            build_retrievers(handle, document_id.as_deref(), self.top_k_per_leg)?;
        let retrieval_query = RetrievalQuery {
            text: &query,
            embedding: query_embedding,
        };
        let fused = fuse(&retrieval_query, &semantic, &lexical, self.weights)?;
        tracing::debug!("Fused {} chunk(s) for query '{query}'", fused.len());
        Ok(fused)
    }

    /// [`Self::retrieve_chunks`] rendered as the citation-annotated context.
    pub fn retrieve(
        &self,
        handle: &IndexHandle,
        args: &RetrieveArgs,
        query_embedding: Option<&[f32]>,
    ) -> Result<String> {
        let fused = self.retrieve_chunks(handle, args, query_embedding)?;
        Ok(render_context(fused.iter().map(|f| &f.chunk)))
    }
}

/// Everything a tool call needs to reach the right snapshot.
#[derive(Clone)]
pub struct RetrievalService {
    repository: Arc<IndexRepository>,
    embedder: Arc<dyn Embedder>,
    engine: RetrievalEngine,
}

impl RetrievalService {
    pub fn new(
        repository: Arc<IndexRepository>,
        embedder: Arc<dyn Embedder>,
        engine: RetrievalEngine,
    ) -> Self {
        Self {
            repository,
            embedder,
            engine,
        }
    }

    /// Retrieve context for one tool call against the scope's current snapshot.
    ///
    /// A scope without an index renders the "no context" marker. Index read
    /// failures abort with [`RetrievalError::Backend`].
    pub async fn retrieve(&self, scope_id: Option<&str>, args: RetrieveArgs) -> Result<String> {
        let handle = match self
            .repository
            .clone()
            .load_handle(scope_id.map(str::to_string))
            .await
        {
            Ok(handle) => handle,
            Err(RetrievalError::IndexUnavailable(scope)) => {
                tracing::warn!("No index for scope '{scope}'; returning empty context");
                return Ok(render_context(std::iter::empty()));
            }
            Err(e) => return Err(e),
        };

        let query = clean_input(&args.query, MAX_QUERY_CHARS);
        let embedding = if query.is_empty() {
            None
        } else {
            match self.embedder.embed_one(&query).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    tracing::warn!("Query embedding failed, lexical leg only: {e:#}");
                    None
                }
            }
        };

        let engine = self.engine;
        tokio::task::spawn_blocking(move || engine.retrieve(&handle, &args, embedding.as_deref()))
            .await
            .map_err(|e| RetrievalError::Backend(format!("retrieval task failed: {e}")))?
    }
}

/// Strip control tokens, collapse whitespace and cap length.
fn clean_input(text: &str, max_chars: usize) -> String {
    let sanitized = sanitize_for_prompt(text);
    let collapsed = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}
