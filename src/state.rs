use std::sync::Arc;

use crate::config::Config;
use crate::llm::chat::{ChatModel, HttpChatModel};
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::search::engine::{RetrievalEngine, RetrievalService};
use crate::search::repository::IndexRepository;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: Arc<IndexRepository>,
    pub retrieval: RetrievalService,
    pub embedder: Arc<dyn Embedder>,
    pub chat_model: Arc<dyn ChatModel>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
    /// Held for the whole of an ingestion run; rebuilds never overlap.
    pub ingest_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let chat_model: Arc<dyn ChatModel> =
            Arc::new(HttpChatModel::new(http_client, config.llm.clone()));

        Self::with_models(config, embedder, chat_model)
    }

    /// State with caller-supplied models (scripted ones in tests).
    pub fn with_models(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat_model: Arc<dyn ChatModel>,
    ) -> anyhow::Result<Self> {
        let engine = RetrievalEngine::from_config(&config.retrieval)?;
        let repository = Arc::new(IndexRepository::new(
            config.data_dir.clone(),
            config.index_scope,
        )?);
        let retrieval = RetrievalService::new(repository.clone(), embedder.clone(), engine);

        Ok(Self {
            config,
            repository,
            retrieval,
            embedder,
            chat_model,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
            ingest_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }
}
