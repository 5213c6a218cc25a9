use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::error::RetrievalError;
use crate::models::Chunk;

/// Writer budget for the persisted corpus-wide index.
const WRITER_BUDGET: usize = 50_000_000;
/// Smallest budget tantivy accepts for a single indexing thread.
const SCOPED_WRITER_BUDGET: usize = 15_000_000;

/// BM25 index over chunk content, built on tantivy.
///
/// Built once and never mutated: the corpus-wide index lives on disk inside
/// an index generation, scoped indexes are built in RAM per query.
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    f_document_id: Field,
    f_chunk_index: Field,
    f_path: Field,
    f_page_label: Field,
    f_content: Field,
}

#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub chunk: Chunk,
    pub score: f32,
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("document_id", STRING | STORED);
    schema_builder.add_u64_field("chunk_index", NumericOptions::default() | STORED);
    schema_builder.add_text_field("path", STRING | STORED);
    schema_builder.add_text_field("page_label", STRING | STORED);
    schema_builder.add_text_field("content", TEXT | STORED);
    schema_builder.build()
}

impl Bm25Index {
    /// Build a fresh on-disk index in an empty directory.
    pub fn create_in_dir(index_dir: &Path, chunks: &[Chunk]) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let index = Index::create_in_dir(index_dir, build_schema())
            .context("Failed to create tantivy index")?;
        let writer = index
            .writer(WRITER_BUDGET)
            .context("Failed to create index writer")?;
        Self::populate(index, writer, chunks)
    }

    /// Build an in-memory index over a chunk subset.
    pub fn in_ram(chunks: &[Chunk]) -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        let writer = index
            .writer_with_num_threads(1, SCOPED_WRITER_BUDGET)
            .context("Failed to create index writer")?;
        Self::populate(index, writer, chunks)
    }

    /// Open an index previously written by [`Bm25Index::create_in_dir`].
    pub fn open(index_dir: &Path) -> Result<Self> {
        let index = Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?;
        Self::from_index(index)
    }

    fn populate(index: Index, mut writer: IndexWriter, chunks: &[Chunk]) -> Result<Self> {
        let this = Self::from_index(index)?;

        for chunk in chunks {
            let mut document = doc!(
                this.f_document_id => chunk.document_id.clone(),
                this.f_chunk_index => chunk.chunk_index as u64,
                this.f_path => chunk.path.clone(),
                this.f_content => chunk.content.clone(),
            );
            if let Some(label) = &chunk.page_label {
                document.add_text(this.f_page_label, label);
            }
            writer.add_document(document)?;
        }

        writer.commit().context("Failed to commit index")?;
        this.reader.reload().context("Failed to reload index reader")?;
        Ok(this)
    }

    fn from_index(index: Index) -> Result<Self> {
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .with_context(|| format!("Index schema missing '{name}' field"))
        };
        let f_document_id = field("document_id")?;
        let f_chunk_index = field("chunk_index")?;
        let f_path = field("path")?;
        let f_page_label = field("page_label")?;
        let f_content = field("content")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        Ok(Self {
            index,
            reader,
            f_document_id,
            f_chunk_index,
            f_path,
            f_page_label,
            f_content,
        })
    }

    /// Search the index and return scored hits, best first.
    ///
    /// Query syntax characters are stripped and the rest parsed leniently, so
    /// user punctuation never fails a search.
    /// Stored documents missing citation metadata are skipped.
    pub fn search(&self, query_str: &str, limit: usize) -> crate::error::Result<Vec<Bm25Hit>> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let cleaned = strip_query_syntax(query_str);
        let query_parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (query, errors) = query_parser.parse_query_lenient(&cleaned);
        if !errors.is_empty() {
            tracing::debug!("Lenient parse of '{query_str}' dropped {} clause(s)", errors.len());
        }

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            match self.chunk_from_doc(&doc) {
                Ok(chunk) => hits.push(Bm25Hit { chunk, score }),
                Err(e) => tracing::warn!("Skipping lexical hit {doc_address:?}: {e}"),
            }
        }

        Ok(hits)
    }

    fn chunk_from_doc(&self, doc: &TantivyDocument) -> crate::error::Result<Chunk> {
        let text = |field: Field, name: &'static str| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(RetrievalError::MalformedMetadata { field: name })
        };

        let document_id = text(self.f_document_id, "document_id")?;
        let path = text(self.f_path, "path")?;
        let content = text(self.f_content, "content")?;
        let chunk_index = doc
            .get_first(self.f_chunk_index)
            .and_then(|v| v.as_u64())
            .ok_or(RetrievalError::MalformedMetadata {
                field: "chunk_index",
            })? as usize;
        let page_label = doc
            .get_first(self.f_page_label)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Chunk {
            document_id,
            chunk_index,
            path,
            page_label,
            content,
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// Replace everything but letters, digits and whitespace with spaces and
/// lowercase the rest, which also disarms the `AND`/`OR`/`NOT` keywords.
pub(crate) fn strip_query_syntax(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
}
