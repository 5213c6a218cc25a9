//! Ingestion runs: collect documents, chunk, embed, build and publish a new
//! index generation for one scope.
//!
//! ```text
//! local folder ──► collect_local_documents ──► chunk_document ─┐
//!                                                              ├──► embed ──► publish
//! manifest (pre-chunked Chunk Store) ──────────────────────────┘
//! ```

pub mod chunker;
pub mod drive;
pub mod local;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::ingest::chunker::{chunk_document, PageText};
use crate::ingest::local::collect_local_documents;
use crate::llm::embeddings::Embedder;
use crate::models::{Chunk, DocumentRecord, GenerationInfo, IngestManifest};
use crate::search::repository::IndexRepository;

/// Where an ingestion run gets its documents.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// Chunks produced by an external parser.
    Manifest(IngestManifest),
    /// A folder of text documents, chunked here.
    LocalDir(PathBuf),
}

/// Run one full ingestion and publish the result. The previous generation
/// keeps serving queries until publication.
pub async fn run_ingestion(
    repository: Arc<IndexRepository>,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    scope_id: Option<String>,
    source: IngestSource,
) -> Result<GenerationInfo> {
    let (documents, chunks) = match source {
        IngestSource::Manifest(manifest) => {
            tracing::info!(
                "Ingesting manifest: {} documents, {} chunks",
                manifest.documents.len(),
                manifest.chunks.len()
            );
            (manifest.documents, manifest.chunks)
        }
        IngestSource::LocalDir(dir) => {
            let chunking = chunking.clone();
            tokio::task::spawn_blocking(move || collect_and_chunk(&dir, &chunking))
                .await
                .context("Local ingestion task failed")??
        }
    };

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    tracing::info!("Embedding {} chunks", texts.len());
    let embeddings = embedder
        .embed(&texts)
        .await
        .context("Failed to embed chunks")?;

    let info = tokio::task::spawn_blocking(move || {
        repository.publish(scope_id.as_deref(), documents, chunks, embeddings)
    })
    .await
    .context("Publish task failed")??;

    tracing::info!(
        "Ingestion complete: generation {} ({} documents, {} chunks)",
        info.generation,
        info.document_count,
        info.chunk_count
    );
    Ok(info)
}

fn collect_and_chunk(
    dir: &std::path::Path,
    chunking: &ChunkingConfig,
) -> Result<(Vec<DocumentRecord>, Vec<Chunk>)> {
    let local = collect_local_documents(dir)?;
    let mut documents = Vec::with_capacity(local.len());
    let mut chunks = Vec::new();

    for doc in local {
        let doc_chunks = chunk_document(&doc.record, &[PageText::unpaged(doc.text)], chunking);
        tracing::debug!("{}: {} chunk(s)", doc.record.path, doc_chunks.len());
        chunks.extend(doc_chunks);
        documents.push(doc.record);
    }
    Ok((documents, chunks))
}
