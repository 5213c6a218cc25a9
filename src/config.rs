use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::search::hybrid::FusionWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of all persisted index generations
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Folder ingested when `POST /api/ingest` carries no manifest
    pub source_dir: PathBuf,
    /// Whether indexes are shared or kept per user/session
    pub index_scope: IndexScope,
    /// Hybrid retrieval tuning
    pub retrieval: RetrievalConfig,
    /// Text splitter settings used during ingestion
    pub chunking: ChunkingConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Origins allowed by CORS (the extension's `chrome-extension://<id>`);
    /// empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexScope {
    /// One index for everyone; request scope ids are ignored.
    Global,
    /// One index per user/session id supplied with each request.
    PerUser,
}

impl IndexScope {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "global" => Some(IndexScope::Global),
            "per_user" | "per-user" | "user" => Some(IndexScope::PerUser),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the dense (embedding) leg
    pub semantic_weight: f32,
    /// Weight of the sparse (BM25) leg
    pub lexical_weight: f32,
    /// Candidates fetched from each leg per query
    pub top_k_per_leg: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            lexical_weight: 0.4,
            top_k_per_leg: 2,
        }
    }
}

impl RetrievalConfig {
    pub fn weights(&self) -> crate::error::Result<FusionWeights> {
        FusionWeights::new(self.semantic_weight, self.lexical_weight)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for the agent
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            source_dir: PathBuf::from("./files"),
            index_scope: IndexScope::Global,
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            llm: LlmConfig::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DRIVE_COPILOT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("DRIVE_COPILOT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("DRIVE_COPILOT_SOURCE_DIR") {
            config.source_dir = PathBuf::from(dir);
        }
        if let Ok(origins) = std::env::var("DRIVE_COPILOT_CORS_ORIGINS") {
            config.cors_origins = parse_list(&origins);
        }
        if let Ok(scope) = std::env::var("DRIVE_COPILOT_INDEX_SCOPE") {
            match IndexScope::parse(&scope) {
                Some(s) => config.index_scope = s,
                None => tracing::warn!("Ignoring unknown DRIVE_COPILOT_INDEX_SCOPE '{scope}'"),
            }
        }

        // Retrieval
        if let Ok(val) = std::env::var("RETRIEVAL_SEMANTIC_WEIGHT") {
            if let Ok(v) = val.parse() {
                config.retrieval.semantic_weight = v;
            }
        }
        if let Ok(val) = std::env::var("RETRIEVAL_LEXICAL_WEIGHT") {
            if let Ok(v) = val.parse() {
                config.retrieval.lexical_weight = v;
            }
        }
        if let Ok(val) = std::env::var("RETRIEVAL_TOP_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.top_k_per_leg = v;
            }
        }

        // Chunking
        if let Ok(val) = std::env::var("CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.chunking.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.chunking.chunk_overlap = v;
            }
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }

        config
    }

    /// Reject settings the retrieval core cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retrieval.weights()?;
        if self.retrieval.top_k_per_leg == 0 {
            anyhow::bail!("top_k_per_leg must be at least 1");
        }
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if let Some(bad) = self
            .cors_origins
            .iter()
            .find(|o| axum::http::HeaderValue::from_str(o).is_err())
        {
            anyhow::bail!("Invalid CORS origin: {bad:?}");
        }
        match self.llm.provider.as_str() {
            "ollama" | "openai" => Ok(()),
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }
}

/// Comma-separated values, trimmed, empties dropped.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
