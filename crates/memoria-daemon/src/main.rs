//! `memoriad` — the agent-memory daemon. Reads configuration from the
//! environment, wires a store, embedding provider, and LLM client into the
//! core facade, spawns the scheduler's background loops, and serves the
//! HTTP API until shutdown.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use memoria_core::embedding::{Embedder, MockEmbedder};
use memoria_core::llm::{LlmClient, NullLlmClient};
use memoria_core::store::memory_store::InMemoryStore;
use memoria_core::store::Store;

use memoria_daemon::config::Config;
use memoria_daemon::{embedding, facade::MemoryFacade, http, llm, scheduler};

const SHUTDOWN_DRAIN_SECONDS: u64 = 30;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!("memoriad starting, port {}", config.port);

    let (store, store_backend): (Arc<dyn Store>, &'static str) = build_store(&config).await;
    let (embedder, embedder_mode): (Arc<dyn Embedder>, &'static str) = build_embedder(&config);
    let llm: Arc<dyn LlmClient> = build_llm(&config);

    let facade = Arc::new(MemoryFacade::new(store, embedder, llm));
    let state = Arc::new(http::AppState::new(facade.clone(), config.memory_api_key.clone(), store_backend, embedder_mode));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let dispatcher = tokio::spawn(scheduler::run_dispatcher(facade.clone(), shutdown_rx.clone()));
    let decay = tokio::spawn(scheduler::run_decay_scheduler(facade.clone(), shutdown_rx.clone()));
    let cleanup = tokio::spawn(scheduler::run_cleanup_scheduler(facade.clone(), shutdown_rx.clone()));

    if let Err(e) = http::serve(state, config.port, shutdown_rx).await {
        error!(error = %e, "HTTP transport exited with an error");
    }

    info!("HTTP transport stopped, signaling background loops to stop");
    let _ = shutdown_tx.send(true);

    let drain = tokio::time::timeout(std::time::Duration::from_secs(SHUTDOWN_DRAIN_SECONDS), async {
        let _ = tokio::join!(dispatcher, decay, cleanup);
    });
    if drain.await.is_err() {
        warn!("background loops did not stop within the shutdown drain window");
    }

    info!("memoriad stopped");
}

async fn build_store(config: &Config) -> (Arc<dyn Store>, &'static str) {
    if config.wants_mongodb() {
        #[cfg(feature = "mongodb-backend")]
        {
            match memoria_daemon::store_mongo::MongoStore::connect(config.mongodb_uri.as_ref().expect("checked by wants_mongodb"), &config.mongodb_db_name).await {
                Ok(store) => return (Arc::new(store), "mongodb"),
                Err(e) => {
                    error!(error = %e, "failed to connect to MongoDB, falling back to the in-memory store");
                }
            }
        }
        #[cfg(not(feature = "mongodb-backend"))]
        {
            warn!("MONGODB_URI is set but this build lacks the mongodb-backend feature; using the in-memory store");
        }
    }
    (Arc::new(InMemoryStore::new()), "in_memory")
}

fn build_embedder(config: &Config) -> (Arc<dyn Embedder>, &'static str) {
    if config.wants_real_embedder() {
        let api_key = config.voyage_api_key.clone().expect("checked by wants_real_embedder");
        (Arc::new(embedding::VoyageEmbedder::new(api_key, config.voyage_model.clone())), "voyage")
    } else {
        (Arc::new(MockEmbedder::new()), "mock")
    }
}

fn build_llm(config: &Config) -> Arc<dyn LlmClient> {
    match &config.llm_endpoint {
        Some(endpoint) => Arc::new(llm::HttpLlmClient::new(endpoint.clone(), config.llm_model.clone(), config.memory_api_key.clone())),
        None => Arc::new(NullLlmClient),
    }
}
