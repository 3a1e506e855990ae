//! Certificate Service
//!
//! REST API for classes, templates and redemptions + background workers
//! running the redemption pipeline

use anyhow::{Context, Result};
use certificate_service::{
    create_router, worker, AppState, ArtifactStore, Config, MemoryArtifactStore, MemoryStore,
    Notifier, Pipeline, PostmarkNotifier, RecordStore, RedisStore, S3ArtifactStore, Worker,
    WorkerConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certificate_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Certificate Service");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded - listening on {}", config.api_address());

    // Certificate storage
    let artifacts: Arc<dyn ArtifactStore> = match config.s3() {
        Some(s3) if !config.mock_mode => Arc::new(S3ArtifactStore::new(&s3).await),
        _ => {
            warn!("Mock mode: certificates are kept in memory");
            Arc::new(MemoryArtifactStore::new())
        }
    };

    // Email delivery
    let notifier: Option<Arc<dyn Notifier>> = match &config.postmark_api_key {
        Some(key) => Some(Arc::new(PostmarkNotifier::new(
            key.clone(),
            config.postmark_api_url.clone(),
            config.email_from.clone(),
        ))),
        None => {
            warn!("POSTMARK_API_KEY not set - certificates will be issued without email");
            None
        }
    };

    // Record stores: the API shares one, each worker owns one because the
    // trigger queue read blocks its connection
    let shared_memory = Arc::new(MemoryStore::new());
    let api_records: Arc<dyn RecordStore> = if config.mock_mode {
        warn!("Mock mode: records are kept in memory");
        shared_memory.clone()
    } else {
        Arc::new(
            RedisStore::new(&config.redis_url)
                .await
                .context("Failed to initialize API storage")?,
        )
    };

    let mut workers = Vec::with_capacity(config.num_workers);
    for id in 0..config.num_workers {
        let records: Arc<dyn RecordStore> = if config.mock_mode {
            shared_memory.clone()
        } else {
            Arc::new(
                RedisStore::new(&config.redis_url)
                    .await
                    .context("Failed to initialize worker storage")?,
            )
        };
        let pipeline = Pipeline::new(records, artifacts.clone(), notifier.clone());
        workers.push(Worker::new(id, WorkerConfig::default(), pipeline));
    }

    // Spawn worker tasks
    let worker_handles = worker::spawn_workers(workers);
    info!("{} worker(s) started, processing redemptions...", worker_handles.len());

    // Create router
    let app = create_router(AppState {
        records: api_records,
    });

    // Start API server
    let listener = tokio::net::TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Certificate Service API running on http://{}", config.api_address());

    // Run server (workers run in background)
    axum::serve(listener, app).await.context("Server error")?;

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}
