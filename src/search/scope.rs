//! Per-query retrievers, optionally restricted to a single document.

use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, RetrievalLeg, RetrievalResult};
use crate::search::bm25::Bm25Index;
use crate::search::repository::IndexHandle;
use crate::search::vector::VectorStore;

/// What a leg is asked for: the cleaned query text and, when the embedding
/// service answered, its embedding.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalQuery<'a> {
    pub text: &'a str,
    pub embedding: Option<&'a [f32]>,
}

/// One leg of the hybrid retriever.
pub trait Retriever: Send + Sync {
    fn leg(&self) -> RetrievalLeg;

    /// Ranked candidates, best first, at most the leg's `k`.
    fn retrieve(&self, query: &RetrievalQuery<'_>) -> Result<Vec<RetrievalResult>>;
}

/// Dense leg: cosine search with an equality filter on `document_id`. A query
/// embedding whose dimension differs from the index aborts the query.
pub struct SemanticRetriever<'a> {
    store: &'a VectorStore,
    document_id: Option<String>,
    k: usize,
}

impl SemanticRetriever<'_> {
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }
}

impl Retriever for SemanticRetriever<'_> {
    fn leg(&self) -> RetrievalLeg {
        RetrievalLeg::Semantic
    }

    fn retrieve(&self, query: &RetrievalQuery<'_>) -> Result<Vec<RetrievalResult>> {
        let Some(embedding) = query.embedding else {
            tracing::warn!("No query embedding; semantic leg skipped");
            return Ok(Vec::new());
        };
        if let Some(dim) = self.store.dimension() {
            if embedding.len() != dim {
                return Err(RetrievalError::Backend(format!(
                    "query embedding has {} dimensions but the index was built with {dim}; \
                     re-ingest after changing the embedding model",
                    embedding.len()
                )));
            }
        }

        Ok(self
            .store
            .search(embedding, self.k, self.document_id.as_deref())
            .into_iter()
            .map(|hit| RetrievalResult {
                chunk: hit.chunk,
                score: hit.score,
                source_leg: RetrievalLeg::Semantic,
            })
            .collect())
    }
}

enum LexicalSource<'a> {
    /// The generation's corpus-wide index.
    Shared(&'a Bm25Index),
    /// A fresh index over one document's chunks.
    Scoped(Bm25Index),
}

/// Sparse leg: BM25 over the full corpus or a single document's chunks.
pub struct LexicalRetriever<'a> {
    source: LexicalSource<'a>,
    document_id: Option<String>,
    k: usize,
}

impl LexicalRetriever<'_> {
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn indexed_chunks(&self) -> u64 {
        match &self.source {
            LexicalSource::Shared(index) => index.num_docs(),
            LexicalSource::Scoped(index) => index.num_docs(),
        }
    }
}

impl Retriever for LexicalRetriever<'_> {
    fn leg(&self) -> RetrievalLeg {
        RetrievalLeg::Lexical
    }

    fn retrieve(&self, query: &RetrievalQuery<'_>) -> Result<Vec<RetrievalResult>> {
        let index = match &self.source {
            LexicalSource::Shared(index) => *index,
            LexicalSource::Scoped(index) => index,
        };

        Ok(index
            .search(query.text, self.k)?
            .into_iter()
            .map(|hit| RetrievalResult {
                chunk: hit.chunk,
                score: hit.score,
                source_leg: RetrievalLeg::Lexical,
            })
            .collect())
    }
}

/// Build both legs for one query. With a document id both are restricted to
/// exactly that document's chunks; without one both see the whole corpus.
pub fn build_retrievers<'a>(
    handle: &'a IndexHandle,
    document_id: Option<&str>,
    k: usize,
) -> Result<(SemanticRetriever<'a>, LexicalRetriever<'a>)> {
    let semantic = SemanticRetriever {
        store: handle.vectors(),
        document_id: document_id.map(str::to_string),
        k,
    };

    let source = match document_id {
        Some(id) => {
            let subset: Vec<Chunk> = handle
                .chunks()
                .iter()
                .filter(|c| c.document_id == id)
                .cloned()
                .collect();
            tracing::debug!("Scoped lexical index over {} chunk(s) of {id}", subset.len());
            LexicalSource::Scoped(Bm25Index::in_ram(&subset)?)
        }
        None => LexicalSource::Shared(handle.lexical()),
    };

    let lexical = LexicalRetriever {
        source,
        document_id: document_id.map(str::to_string),
        k,
    };

    Ok((semantic, lexical))
}
