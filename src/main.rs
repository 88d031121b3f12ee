use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;

use adminhub::{
    cache::{Cache, CacheStore, MemoryCache, RedisCache},
    config::{CacheBackendKind, Config},
    create_router,
    database::{create_database_pool, run_migrations},
    seed::seed,
    store::{MemoryStore, PgStore, Store},
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("adminhub failed to start: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let db = create_database_pool(url).await?;
            run_migrations(&db).await?;
            Arc::new(PgStore::new(db))
        }
        None => {
            log::warn!("DATABASE_URL not set; using the in-memory store, data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let cache_store = connect_cache(&config).await;
    let cache = Cache::new(cache_store, config.cache_short_ttl, config.cache_long_ttl);

    let report = seed(store.as_ref(), &config).await?;
    if report.admin_created {
        log::info!("bootstrap admin account created");
    }

    let state = AppState::new(config, store, cache);
    // Seeding may have changed grants behind a persistent cache.
    state.resolver.invalidate_all().await;

    let addr = format!("0.0.0.0:{}", state.config.port);
    let prefix = state.config.api_prefix.clone();
    let app = create_router(state);

    log::info!("adminhub listening on http://{addr} (API under {prefix})");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_cache(config: &Config) -> Arc<dyn CacheStore> {
    if config.cache_backend == CacheBackendKind::Redis {
        if let Some(url) = &config.redis_url {
            match RedisCache::connect(url).await {
                Ok(redis) => return Arc::new(redis),
                Err(err) => log::warn!("Redis unavailable ({err}); falling back to the in-memory cache"),
            }
        }
    }
    Arc::new(MemoryCache::new())
}
