use tracing_subscriber::EnvFilter;

use drive_copilot::api;
use drive_copilot::config::Config;
use drive_copilot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Index scope: {:?}", config.index_scope);
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Fusion weights: semantic={} lexical={}, top_k_per_leg={}",
        config.retrieval.semantic_weight,
        config.retrieval.lexical_weight,
        config.retrieval.top_k_per_leg
    );
    if config.cors_origins.is_empty() {
        tracing::info!("CORS: any origin");
    } else {
        tracing::info!("CORS origins: {}", config.cors_origins.join(", "));
    }

    let state = AppState::new(config.clone())?;

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
