//! # Catalog Sync
//!
//! [`CatalogSync`] runs the whole pipeline once per call:
//!
//! 1. load asset documents from the configured [`CatalogSource`]
//! 2. extract candidates and dedupe them, then append the seed tokens
//! 3. price them in length-bounded batches
//! 4. reconcile into the catalog in one transaction
//! 5. record the upstream revision, only if step 4 committed
//!
//! At most one run is in flight; an overlapping call fails fast with
//! [`SyncError::AlreadyRunning`]. Shutdown is cooperative: the cancellation
//! token is checked between documents and between price batches, never in
//! the middle of a commit.

use crate::cancel::{checkpoint, Cancelled};
use crate::catalog_source::{CatalogSource, SourceError};
use crate::deduplicator::{append_seeds, dedupe};
use crate::extractor::extract;
use crate::mirror::MirrorError;
use crate::price_batcher::PriceEnricher;
use crate::reconciler::reconcile;
use crate::settings::SeedToken;
use crate::store::{parse_symbol_filter, CatalogStore, RevisionStore, StoreError};
use crate::types::CatalogEntry;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
    #[error("registry mirror unavailable: {0}")]
    Mirror(#[from] MirrorError),
    #[error("catalog store: {0}")]
    Store(#[from] StoreError),
    #[error("sync cancelled")]
    Cancelled,
}

impl From<Cancelled> for SyncError {
    fn from(_: Cancelled) -> Self {
        SyncError::Cancelled
    }
}

impl From<SourceError> for SyncError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Mirror(e) => SyncError::Mirror(e),
            SourceError::Cancelled(_) => SyncError::Cancelled,
        }
    }
}

/// Holds `running` up for the lifetime of a run, whichever way it exits.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What one successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub source: &'static str,
    pub documents: usize,
    pub candidates: usize,
    pub deduplicated: usize,
    pub priced: usize,
    /// Candidates with no market record or no usable price
    pub dropped: usize,
    pub failed_batches: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Upstream revision recorded by this run, if any
    pub revision: Option<String>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} dropped ({} docs, {} candidates, {} after dedup) in {}ms",
            self.created,
            self.updated,
            self.skipped,
            self.dropped,
            self.documents,
            self.candidates,
            self.deduplicated,
            self.duration_ms
        )
    }
}

pub struct CatalogSync {
    source: Arc<dyn CatalogSource>,
    enricher: PriceEnricher,
    store: Arc<dyn CatalogStore>,
    revisions: Arc<dyn RevisionStore>,
    seeds: Vec<SeedToken>,
    run_lock: Mutex<()>,
    /// Mirrors `run_lock` for observers; readers never touch the mutex
    running: AtomicBool,
    cancel: CancellationToken,
    last_report: RwLock<Option<SyncReport>>,
}

impl CatalogSync {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        enricher: PriceEnricher,
        store: Arc<dyn CatalogStore>,
        revisions: Arc<dyn RevisionStore>,
        seeds: Vec<SeedToken>,
    ) -> Self {
        Self {
            source,
            enricher,
            store,
            revisions,
            seeds,
            run_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            last_report: RwLock::new(None),
        }
    }

    /// Token that stops the current and any later run at the next checkpoint.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    /// Run the pipeline once.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        let _running = RunningFlag::raise(&self.running);

        let started_at = Utc::now();
        let timer = Instant::now();
        info!("CatalogSync: run started (source: {})", self.source.name());

        let loaded = self.source.load_documents(&self.cancel).await?;
        checkpoint(&self.cancel)?;

        let candidates = extract(&loaded.documents);
        let candidate_count = candidates.len();
        let kept = dedupe(candidates);
        let deduplicated = kept.len();
        let kept = append_seeds(kept, &self.seeds);
        debug!(
            "CatalogSync: {} candidates, {} after dedup, {} with seeds",
            candidate_count,
            deduplicated,
            kept.len()
        );

        let enriched = self.enricher.enrich(kept, &self.cancel).await?;
        checkpoint(&self.cancel)?;

        let summary = reconcile(self.store.as_ref(), &enriched.tokens).await?;

        let revision = match loaded.pending_revision {
            Some(rev) => match self.revisions.set(&rev).await {
                Ok(()) => Some(rev),
                Err(e) => {
                    // Catalog is committed; next run just re-extracts
                    warn!("⚠️ CatalogSync: could not record revision {}: {}", rev, e);
                    None
                }
            },
            None => None,
        };

        let report = SyncReport {
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            source: self.source.name(),
            documents: loaded.documents.len(),
            candidates: candidate_count,
            deduplicated,
            priced: enriched.tokens.len(),
            dropped: enriched.dropped,
            failed_batches: enriched.failed_batches,
            created: summary.created,
            updated: summary.updated,
            skipped: summary.skipped,
            revision,
        };

        info!("✅ CatalogSync: {}", report);
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Committed catalog rows, optionally filtered by a comma-delimited,
    /// case-insensitive symbol list. Blank or absent filter returns everything.
    pub async fn lookup(&self, symbol_filter: Option<&str>) -> Result<Vec<CatalogEntry>, StoreError> {
        let symbols = parse_symbol_filter(symbol_filter);
        self.store.find_by_symbols(symbols.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_source::SourceDocuments;
    use crate::fetch::{FetchError, FetchResponse, HttpFetch};
    use crate::memory_store::MemoryStore;
    use crate::settings::Market;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl CatalogSource for EmptySource {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn load_documents(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<SourceDocuments, SourceError> {
            Ok(SourceDocuments::default())
        }
    }

    struct Offline;

    #[async_trait]
    impl HttpFetch for Offline {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn catalog_sync() -> CatalogSync {
        let store = Arc::new(MemoryStore::new());
        CatalogSync::new(
            Arc::new(EmptySource),
            PriceEnricher::new(Arc::new(Offline), &Market::default()),
            store.clone(),
            store,
            vec![],
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_polling_is_running_never_blocks_a_sequential_sync() {
        let sync = Arc::new(catalog_sync());
        let stop = Arc::new(AtomicBool::new(false));

        let poller = {
            let sync = sync.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let _ = sync.is_running();
                }
            })
        };

        for _ in 0..2_000 {
            sync.sync().await.unwrap();
        }

        stop.store(true, Ordering::SeqCst);
        poller.join().unwrap();
        assert!(!sync.is_running());
    }

    #[tokio::test]
    async fn test_running_flag_cleared_after_failed_run() {
        let sync = catalog_sync();
        sync.cancellation_token().cancel();

        assert!(matches!(sync.sync().await, Err(SyncError::Cancelled)));
        assert!(!sync.is_running());
    }
}
