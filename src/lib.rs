//! # drive-copilot
//!
//! Retrieval backend for a cloud-drive assistant: documents are chunked and
//! indexed twice (dense embeddings and BM25), and questions are answered by an
//! LLM agent that calls a scoped hybrid retrieval tool and cites its sources.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────────┐
//!                     │ POST /search {query} │
//!                     └──────────┬───────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │     Agent shell      │
//!                     │ hint + cleaned query │
//!                     └──────────┬───────────┘
//!                                │ context_retriever(hint, is_folder, query)
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │    Path resolver     │
//!                     │ hint -> document_id? │
//!                     └──────────┬───────────┘
//!                 ┌──────────────┴──────────────┐
//!                 ▼                             ▼
//!        ┌─────────────────┐          ┌─────────────────┐
//!        │  Semantic leg   │          │   Lexical leg   │
//!        │ cosine, filter  │          │ BM25, scoped    │
//!        │ on document_id  │          │ index if hint   │
//!        └────────┬────────┘          └────────┬────────┘
//!                 └──────────────┬──────────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │  Weighted RRF fusion │
//!                     │  0.6 / 0.4, dedup    │
//!                     └──────────┬───────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │   Context renderer   │
//!                     │ (path, page, chunk)  │
//!                     └──────────┬───────────┘
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │  Cited final answer  │
//!                     └──────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for storage, fusion and LLM settings
//! - [`error`] - `RetrievalError`, the retrieval core's error taxonomy
//! - [`models`] - Shared data types: `DocumentRecord`, `Chunk`, request/response types
//! - [`search::path_index`] - Resolves a file/folder mention to a document id
//! - [`search::bm25`] - BM25 chunk index powered by tantivy
//! - [`search::vector`] - Vector store with cosine similarity and a document filter
//! - [`search::scope`] - Builds both retrieval legs, optionally scoped to one document
//! - [`search::hybrid`] - Weighted Reciprocal Rank Fusion of the two legs
//! - [`search::render`] - Citation-annotated context rendering and parsing
//! - [`search::repository`] - Index generations, snapshot publication, per-user scopes
//! - [`search::engine`] - The retrieval tool: resolve, scope, fuse, render
//! - [`ingest`] - Local folder and manifest ingestion, chunking, drive paths
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::chat`] - Chat completion client
//! - [`llm::agent`] - JSON tool-calling loop around the retrieval tool
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
