use rs_catalog::cache::{spawn_sweeper, CacheAside, CacheStore};
use rs_catalog::config::AppConfig;
use rs_catalog::server::{run_server, AppState};
use rs_catalog::service::CatalogService;
use rs_catalog::storage::{CollectionRegistry, SeedData};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    let registry = match &config.data_dir {
        Some(dir) => CollectionRegistry::open_sled(dir)?,
        None => {
            info!("CATALOG_DATA_DIR not set, using in-memory collections");
            CollectionRegistry::in_memory()
        }
    };

    if let Some(path) = &config.seed {
        let loaded = SeedData::from_path(path)?.load_into(&registry).await?;
        info!(loaded, seed = %path.display(), "seed data loaded");
    }

    let store = Arc::new(CacheStore::new(config.cache.clone()));
    let sweeper = spawn_sweeper(&store);
    info!(
        default_ttl_secs = config.cache.default_ttl.as_secs(),
        check_period_secs = config.cache.check_period.as_secs(),
        coalesce = config.cache.coalesce_misses,
        "cache ready"
    );

    let service = CatalogService::new(CacheAside::new(store), registry.clone());
    let result = run_server(AppState::new(service), config.addr()).await;

    sweeper.shutdown().await;
    registry.flush_all().await?;
    info!("server stopped");
    result
}
