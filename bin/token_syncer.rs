//! # Token Syncer Service
//!
//! Keeps the token catalog in sync with the chain registry and serves it over
//! HTTP.
//!
//! ## Overview
//!
//! This service:
//! - Runs a sync at startup and then every `sync.interval_seconds`
//! - Serves `GET /tokens/?symbol__in=...` and `GET /health` on `server.bind_addr`
//! - Handles graceful shutdown on Ctrl+C (the in-flight run stops at its next
//!   checkpoint, never mid-commit)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin token_syncer                 # long-running service
//! cargo run --bin token_syncer -- --once       # single run, then exit
//! cargo run --bin token_syncer -- --memory     # no database, in-process catalog
//! ```

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use token_catalog_sync::{
    api,
    catalog_source::{CatalogSource, HostedIndexSource, MirrorCatalogSource},
    database,
    fetch::{HttpFetch, ReqwestFetcher},
    memory_store::MemoryStore,
    mirror::{GitMirror, MirrorTracker},
    price_batcher::PriceEnricher,
    settings::{Settings, SourceKind},
    store::{CatalogStore, RevisionStore},
    sync::{CatalogSync, SyncError},
};

#[derive(Parser, Debug)]
#[command(name = "token_syncer", about = "Token catalog sync service")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Run a single sync and exit
    #[arg(long)]
    once: bool,

    /// Keep the catalog in memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();
    let settings = Settings::from_path(&args.config)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log.level.as_str()),
    )
    .init();

    info!("🚀 Starting token catalog sync");

    // 1. HTTP clients: the API key only goes to the pricing service
    let timeout = Duration::from_millis(settings.market.timeout_ms);
    let registry_fetcher: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(timeout)?);
    let mut market_fetcher = ReqwestFetcher::new(timeout)?;
    if let Some(key) = &settings.market.api_key {
        market_fetcher = market_fetcher.with_header(settings.market.api_key_header.as_str(), key.as_str());
    }

    // 2. Storage
    let (store, revisions): (Arc<dyn CatalogStore>, Arc<dyn RevisionStore>) = if args.memory {
        warn!("⚠️ Using in-memory catalog; nothing survives a restart");
        let store = Arc::new(MemoryStore::new());
        (store.clone(), store)
    } else {
        let store = Arc::new(database::connect(&settings.database).await?);
        info!("✅ Database connected");
        (store.clone(), store)
    };

    // 3. Asset document source
    let registry = &settings.registry;
    let source: Arc<dyn CatalogSource> = match registry.source {
        SourceKind::Mirror => {
            let tracker = MirrorTracker::new(
                registry_fetcher.clone(),
                Arc::new(GitMirror::new(registry.branch.clone())),
                revisions.clone(),
                registry.remote_url.clone(),
                registry.revision_url.clone(),
                registry.mirror_path.clone(),
            );
            Arc::new(MirrorCatalogSource::new(tracker))
        }
        SourceKind::Hosted => Arc::new(HostedIndexSource::new(
            registry_fetcher.clone(),
            registry.hosted_index_url.clone(),
            registry.hosted_chains.clone(),
        )),
    };
    info!("✅ Catalog source: {}", source.name());

    let sync = Arc::new(CatalogSync::new(
        source,
        PriceEnricher::new(Arc::new(market_fetcher), &settings.market),
        store,
        revisions,
        settings.sync.seed_tokens.clone(),
    ));

    if args.once {
        let report = sync.sync().await?;
        info!("✅ Single run complete: {}", report);
        return Ok(());
    }

    // 4. HTTP server
    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    info!("✅ Serving catalog on http://{}", settings.server.bind_addr);
    let app = api::router(sync.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("❌ HTTP server stopped: {}", e);
        }
    });

    // 5. Sync loop, first tick fires immediately
    let cancel = sync.cancellation_token();
    let interval_seconds = settings.sync.interval_seconds.max(1);
    info!("   Sync interval: {} seconds", interval_seconds);

    let sync_handle = {
        let sync = sync.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_seconds));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match sync.sync().await {
                    Ok(_) => {}
                    Err(SyncError::Cancelled) => break,
                    Err(SyncError::AlreadyRunning) => warn!("⚠️ Previous sync still running, skipping tick"),
                    Err(e) => error!("❌ Sync run failed: {}", e),
                }
            }
        })
    };

    signal::ctrl_c().await?;
    info!("🛑 Shutdown signal received, stopping...");
    cancel.cancel();

    if let Err(e) = sync_handle.await {
        warn!("⚠️ Sync task ended abnormally: {}", e);
    }
    server_handle.abort();

    info!("✅ Shutdown complete");
    Ok(())
}
