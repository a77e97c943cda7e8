use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::llm::HttpRuntime;
use crate::resources::ResourceCache;
use crate::store::ChunkStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub resources: Arc<ResourceCache>,
    pub store: Arc<ChunkStore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let runtime = Arc::new(HttpRuntime::new(
            http_client,
            config.llm.clone(),
            config.reranker.clone(),
        ));

        let resources = Arc::new(ResourceCache::new(runtime));
        resources.start_sweeper(
            Duration::from_secs(config.cache.sweep_interval_secs),
            Duration::from_secs(config.cache.max_idle_secs),
        );

        let store = ChunkStore::open_or_create(&config.store_dir())
            .map_err(|e| anyhow::anyhow!("Failed to open chunk store: {e}"))?;

        Ok(Self {
            config,
            resources,
            store: Arc::new(store),
        })
    }
}
