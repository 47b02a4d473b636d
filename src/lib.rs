//! # Token Catalog Sync
//!
//! Keeps a deduplicated catalog of tradable tokens in sync with a
//! revision-controlled chain registry, priced from a CoinGecko-style market
//! data service, and serves it by symbol.
//!
//! ## Pipeline
//!
//! One run flows strictly left to right:
//!
//! ```text
//! CatalogSource -> extract -> dedupe (+ seeds) -> PriceEnricher -> reconcile -> revision marker
//! ```
//!
//! - **Source**: a local git mirror of the registry ([`mirror`]) or per-chain
//!   asset lists fetched over HTTP ([`catalog_source::HostedIndexSource`])
//! - **Dedup**: registry assets are keyed by native denom *and* by market id;
//!   [`deduplicator`] reconciles the two key spaces
//! - **Pricing**: ids are packed into length-bounded queries, one request at
//!   a time ([`price_batcher`])
//! - **Persistence**: a single transaction per run, marker written only after
//!   it commits ([`reconciler`], [`sync`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use token_catalog_sync::{
//!     catalog_source::HostedIndexSource, fetch::ReqwestFetcher, memory_store::MemoryStore,
//!     price_batcher::PriceEnricher, settings::Settings, sync::CatalogSync,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let fetcher = Arc::new(ReqwestFetcher::new(std::time::Duration::from_secs(10))?);
//! let store = Arc::new(MemoryStore::new());
//!
//! let sync = CatalogSync::new(
//!     Arc::new(HostedIndexSource::new(
//!         fetcher.clone(),
//!         settings.registry.hosted_index_url.clone(),
//!         settings.registry.hosted_chains.clone(),
//!     )),
//!     PriceEnricher::new(fetcher, &settings.market),
//!     store.clone(),
//!     store,
//!     settings.sync.seed_tokens.clone(),
//! );
//!
//! let report = sync.sync().await?;
//! let atoms = sync.lookup(Some("ATOM")).await?;
//! # Ok(())
//! # }
//! ```

// Core Types
/// Registry documents, market records and catalog rows
pub mod types;

// Pipeline
/// Asset document sources (git mirror, hosted index)
pub mod catalog_source;
/// Local registry mirror and refresh decision
pub mod mirror;
/// Asset document to candidate extraction
pub mod extractor;
/// Two-pass candidate deduplication
pub mod deduplicator;
/// Length-bounded price batching and market-data join
pub mod price_batcher;
/// Transactional catalog upsert
pub mod reconciler;
/// Run orchestration, run-lock and lookup
pub mod sync;
/// Cooperative cancellation checkpoints
pub mod cancel;

// Infrastructure
/// HTTP fetch capability
pub mod fetch;
/// Storage traits
pub mod store;
/// PostgreSQL catalog store
pub mod database;
/// In-process catalog store
pub mod memory_store;
/// HTTP read API
pub mod api;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use settings::Settings;
pub use store::{CatalogStore, RevisionStore};
pub use sync::{CatalogSync, SyncError, SyncReport};
pub use types::CatalogEntry;
