//! Index snapshots and where they live.
//!
//! Every ingestion run writes a complete new generation directory and then
//! publishes it by rewriting `CURRENT` and swapping the cached handle. Queries
//! hold an `Arc<IndexHandle>` for their whole lifetime, so they always see one
//! consistent snapshot; new data becomes visible only after publication.
//!
//! ```text
//! <data_dir>/<scope>/CURRENT
//! <data_dir>/<scope>/<generation>/generation.json
//! <data_dir>/<scope>/<generation>/documents.json
//! <data_dir>/<scope>/<generation>/vectors.json     chunks + embeddings
//! <data_dir>/<scope>/<generation>/lexical/         tantivy
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::IndexScope;
use crate::error::RetrievalError;
use crate::models::{Chunk, DocumentRecord, GenerationInfo, IngestionStatus};
use crate::search::bm25::Bm25Index;
use crate::search::path_index::PathIndex;
use crate::search::vector::VectorStore;

const CURRENT_FILE: &str = "CURRENT";
const GLOBAL_SCOPE: &str = "global";

/// One immutable, queryable index generation.
pub struct IndexHandle {
    info: GenerationInfo,
    paths: PathIndex,
    chunks: Vec<Chunk>,
    vectors: VectorStore,
    lexical: Bm25Index,
}

impl IndexHandle {
    /// Validate the corpus and build all three indexes. The lexical index is
    /// written to `lexical_dir` when given, otherwise kept in RAM.
    pub fn build(
        generation: &str,
        documents: Vec<DocumentRecord>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        lexical_dir: Option<&Path>,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let documents = dedup_documents(documents);
        let (chunks, embeddings) = retain_valid_chunks(&documents, chunks, embeddings);
        warn_on_gaps(&chunks);

        let vectors = VectorStore::from_chunks(&chunks, embeddings)?;
        let lexical = match lexical_dir {
            Some(dir) => Bm25Index::create_in_dir(dir, &chunks)?,
            None => Bm25Index::in_ram(&chunks)?,
        };

        let info = GenerationInfo {
            generation: generation.to_string(),
            built_at: Utc::now(),
            document_count: documents.len(),
            chunk_count: chunks.len(),
            embedding_dim: vectors.dimension(),
        };
        let paths = PathIndex::build(documents)?;

        Ok(Self {
            info,
            paths,
            chunks,
            vectors,
            lexical,
        })
    }

    fn save(&self, dir: &Path) -> Result<()> {
        std::fs::write(
            dir.join("documents.json"),
            serde_json::to_string(self.paths.records())?,
        )
        .context("Failed to write documents.json")?;
        self.vectors.save(&dir.join("vectors.json"))?;
        std::fs::write(
            dir.join("generation.json"),
            serde_json::to_string_pretty(&self.info)?,
        )
        .context("Failed to write generation.json")?;
        Ok(())
    }

    fn load(dir: &Path) -> Result<Self> {
        let info: GenerationInfo = serde_json::from_str(
            &std::fs::read_to_string(dir.join("generation.json"))
                .context("Failed to read generation.json")?,
        )?;
        let documents: Vec<DocumentRecord> = serde_json::from_str(
            &std::fs::read_to_string(dir.join("documents.json"))
                .context("Failed to read documents.json")?,
        )?;
        let vectors = VectorStore::load(&dir.join("vectors.json"))?;
        let chunks = vectors.chunks().cloned().collect();
        let lexical = Bm25Index::open(&dir.join("lexical"))?;
        let paths = PathIndex::build(documents)?;

        Ok(Self {
            info,
            paths,
            chunks,
            vectors,
            lexical,
        })
    }

    pub fn info(&self) -> &GenerationInfo {
        &self.info
    }

    pub fn paths(&self) -> &PathIndex {
        &self.paths
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }
}

/// Keep the first record per id; drop records with an empty id or path.
fn dedup_documents(documents: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|d| {
            if d.id.trim().is_empty() || d.path.trim().is_empty() {
                tracing::warn!("Skipping document record with empty id or path: {d:?}");
                return false;
            }
            if !seen.insert(d.id.clone()) {
                tracing::warn!("Skipping duplicate document id {}", d.id);
                return false;
            }
            true
        })
        .collect()
}

/// Drop chunks that cannot be cited: unknown document, empty path or text,
/// or a missing embedding. Embeddings whose dimension differs from the first
/// kept one are dropped too. Embeddings stay parallel with the kept chunks.
fn retain_valid_chunks(
    documents: &[DocumentRecord],
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
) -> (Vec<Chunk>, Vec<Vec<f32>>) {
    let known: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    let mut kept_chunks = Vec::with_capacity(chunks.len());
    let mut kept_embeddings = Vec::with_capacity(embeddings.len());
    let mut skipped = 0usize;
    let mut dimension: Option<usize> = None;

    for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
        let problem = if !known.contains(chunk.document_id.as_str()) {
            Some(RetrievalError::MalformedMetadata {
                field: "document_id",
            })
        } else if chunk.path.trim().is_empty() {
            Some(RetrievalError::MalformedMetadata { field: "path" })
        } else if chunk.content.trim().is_empty() {
            Some(RetrievalError::MalformedMetadata { field: "content" })
        } else if embedding.is_empty() || dimension.is_some_and(|d| d != embedding.len()) {
            Some(RetrievalError::MalformedMetadata { field: "embedding" })
        } else {
            None
        };

        match problem {
            Some(e) => {
                tracing::warn!(
                    "Skipping chunk {}#{}: {e}",
                    chunk.document_id,
                    chunk.chunk_index
                );
                skipped += 1;
            }
            None => {
                dimension.get_or_insert(embedding.len());
                kept_chunks.push(chunk);
                kept_embeddings.push(embedding);
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("Skipped {skipped} malformed chunk(s)");
    }
    (kept_chunks, kept_embeddings)
}

fn warn_on_gaps(chunks: &[Chunk]) {
    let mut per_doc: HashMap<&str, Vec<usize>> = HashMap::new();
    for c in chunks {
        per_doc.entry(&c.document_id).or_default().push(c.chunk_index);
    }
    for (doc, mut indices) in per_doc {
        indices.sort_unstable();
        if indices.iter().enumerate().any(|(i, idx)| i != *idx) {
            tracing::warn!("Chunk indices of {doc} are not contiguous from 0");
        }
    }
}

/// Build and save a generation into `dir`, then point `CURRENT` at it.
fn write_generation(
    scope_dir: &Path,
    dir: &Path,
    generation: &str,
    documents: Vec<DocumentRecord>,
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
) -> Result<IndexHandle> {
    let handle = IndexHandle::build(
        generation,
        documents,
        chunks,
        embeddings,
        Some(&dir.join("lexical")),
    )?;
    handle.save(dir)?;

    // Atomic pointer swap on disk (temp file + rename)
    let current = scope_dir.join(CURRENT_FILE);
    let tmp = scope_dir.join("CURRENT.tmp");
    std::fs::write(&tmp, generation)?;
    std::fs::rename(&tmp, &current).context("Failed to publish CURRENT")?;
    Ok(handle)
}

/// Selects and publishes index snapshots, globally or per user/session.
pub struct IndexRepository {
    root: PathBuf,
    scope: IndexScope,
    handles: RwLock<HashMap<String, Arc<IndexHandle>>>,
}

impl IndexRepository {
    pub fn new(root: impl Into<PathBuf>, scope: IndexScope) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create {}", root.display()))?;
        Ok(Self {
            root,
            scope,
            handles: RwLock::new(HashMap::new()),
        })
    }

    /// Directory key for a request's scope id.
    pub fn scope_key(&self, scope_id: Option<&str>) -> crate::error::Result<String> {
        match self.scope {
            IndexScope::Global => Ok(GLOBAL_SCOPE.to_string()),
            IndexScope::PerUser => {
                let id = scope_id.map(str::trim).unwrap_or_default();
                let valid = !id.is_empty()
                    && id.len() <= 128
                    && id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if valid {
                    Ok(format!("user-{id}"))
                } else {
                    Err(RetrievalError::IndexUnavailable(
                        "a valid scope id is required".to_string(),
                    ))
                }
            }
        }
    }

    /// The current snapshot for a scope, loading it from disk on first use.
    pub fn handle(&self, scope_id: Option<&str>) -> crate::error::Result<Arc<IndexHandle>> {
        let key = self.scope_key(scope_id)?;
        if let Some(handle) = self.handles.read().get(&key) {
            return Ok(handle.clone());
        }

        let Some(generation) = self.current_generation(&key)? else {
            return Err(RetrievalError::IndexUnavailable(key));
        };
        let dir = self.root.join(&key).join(&generation);
        let loaded = Arc::new(IndexHandle::load(&dir).with_context(|| {
            format!("Failed to load index generation {}", dir.display())
        })?);
        tracing::info!(
            "Loaded index generation {generation} for {key} ({} chunks)",
            loaded.chunks().len()
        );

        let mut handles = self.handles.write();
        Ok(handles.entry(key).or_insert(loaded).clone())
    }

    /// Build, persist and atomically publish a new generation for a scope.
    pub fn publish(
        &self,
        scope_id: Option<&str>,
        documents: Vec<DocumentRecord>,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<GenerationInfo> {
        let key = self.scope_key(scope_id)?;
        let scope_dir = self.root.join(&key);
        let generation = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let previous = self.current_generation(&key)?;
        let dir = scope_dir.join(&generation);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let written = write_generation(
            &scope_dir,
            &dir,
            &generation,
            documents,
            chunks,
            embeddings,
        );
        let handle = match written {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!("Failed to remove partial generation {generation}: {cleanup}");
                }
                return Err(e);
            }
        };
        let info = handle.info().clone();

        self.handles.write().insert(key.clone(), Arc::new(handle));
        tracing::info!(
            "Published generation {generation} for {key}: {} documents, {} chunks",
            info.document_count,
            info.chunk_count
        );

        self.prune_generations(&scope_dir, &generation, previous.as_deref());
        Ok(info)
    }

    /// [`Self::handle`] on the blocking pool; the first call for a scope
    /// reads the generation from disk.
    pub async fn load_handle(
        self: Arc<Self>,
        scope_id: Option<String>,
    ) -> crate::error::Result<Arc<IndexHandle>> {
        tokio::task::spawn_blocking(move || self.handle(scope_id.as_deref()))
            .await
            .map_err(|e| RetrievalError::Backend(format!("index load task failed: {e}")))?
    }

    /// [`Self::status`] on the blocking pool.
    pub async fn load_status(
        self: Arc<Self>,
        scope_id: Option<String>,
    ) -> crate::error::Result<IngestionStatus> {
        tokio::task::spawn_blocking(move || self.status(scope_id.as_deref()))
            .await
            .map_err(|e| RetrievalError::Backend(format!("status task failed: {e}")))
    }

    pub fn status(&self, scope_id: Option<&str>) -> IngestionStatus {
        match self.handle(scope_id) {
            Ok(handle) => IngestionStatus {
                ingestion_status: true,
                generation: Some(handle.info().clone()),
                files: handle
                    .paths()
                    .records()
                    .iter()
                    .map(|r| r.path.clone())
                    .collect(),
            },
            Err(e) => {
                tracing::debug!("No index for status request: {e}");
                IngestionStatus {
                    ingestion_status: false,
                    generation: None,
                    files: Vec::new(),
                }
            }
        }
    }

    fn current_generation(&self, key: &str) -> Result<Option<String>> {
        let path = self.root.join(key).join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let generation = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let generation = generation.trim();
        Ok((!generation.is_empty()).then(|| generation.to_string()))
    }

    /// Delete generations other than the current and the one it replaced.
    /// The previous one may still be read by in-flight queries.
    fn prune_generations(&self, scope_dir: &Path, current: &str, previous: Option<&str>) {
        let Ok(entries) = std::fs::read_dir(scope_dir) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == current || Some(name.as_str()) == previous || !entry.path().is_dir() {
                continue;
            }
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                tracing::warn!("Failed to prune old generation {name}: {e}");
            }
        }
    }
}
