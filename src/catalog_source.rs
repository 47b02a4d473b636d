//! Where asset documents come from. Both sources hand the pipeline the same
//! `(origin, contents)` pairs; nothing downstream knows which one ran.

use crate::cancel::{checkpoint, Cancelled};
use crate::fetch::HttpFetch;
use crate::mirror::{MirrorError, MirrorTracker, ASSET_LIST_FILE};
use crate::types::AssetDocument;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Documents for one run, plus the upstream revision they were read at when
/// the source has one.
#[derive(Debug, Clone, Default)]
pub struct SourceDocuments {
    pub documents: Vec<AssetDocument>,
    /// Written to the revision marker only after the run commits
    pub pending_revision: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Mirror(#[from] MirrorError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load_documents(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SourceDocuments, SourceError>;
}

/// Reads `<mirror>/<chain>/assetlist.json` from a local git mirror of the
/// registry, refreshing the mirror first when upstream moved.
pub struct MirrorCatalogSource {
    tracker: MirrorTracker,
}

impl MirrorCatalogSource {
    pub fn new(tracker: MirrorTracker) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl CatalogSource for MirrorCatalogSource {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn load_documents(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SourceDocuments, SourceError> {
        let status = self.tracker.ensure_fresh().await?;
        checkpoint(cancel)?;

        let documents = self
            .tracker
            .repo()
            .list_tree(self.tracker.local_path())
            .await?;
        info!(
            "MirrorCatalogSource: {} asset documents (refreshed: {})",
            documents.len(),
            status.refreshed
        );

        Ok(SourceDocuments {
            documents,
            pending_revision: status.pending_revision,
        })
    }
}

/// Fetches `<index>/<chain>/assetlist.json` over HTTP for a fixed chain list.
/// A chain that fails to download is skipped.
pub struct HostedIndexSource {
    fetcher: Arc<dyn HttpFetch>,
    index_url: String,
    chains: Vec<String>,
}

impl HostedIndexSource {
    pub fn new(fetcher: Arc<dyn HttpFetch>, index_url: impl Into<String>, chains: Vec<String>) -> Self {
        Self {
            fetcher,
            index_url: index_url.into(),
            chains,
        }
    }

    fn document_url(&self, chain: &str) -> String {
        format!(
            "{}/{}/{}",
            self.index_url.trim_end_matches('/'),
            chain,
            ASSET_LIST_FILE
        )
    }
}

#[async_trait]
impl CatalogSource for HostedIndexSource {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn load_documents(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SourceDocuments, SourceError> {
        let mut documents = Vec::with_capacity(self.chains.len());

        for chain in &self.chains {
            checkpoint(cancel)?;
            let url = self.document_url(chain);
            match self.fetcher.get_ok(&url).await {
                Ok(contents) => documents.push(AssetDocument {
                    origin: format!("{}/{}", chain, ASSET_LIST_FILE),
                    contents,
                }),
                Err(e) => warn!("⚠️ HostedIndexSource: skipping {}: {}", chain, e),
            }
        }

        info!(
            "HostedIndexSource: {}/{} chains fetched",
            documents.len(),
            self.chains.len()
        );
        Ok(SourceDocuments {
            documents,
            pending_revision: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResponse};

    struct Index;

    #[async_trait]
    impl HttpFetch for Index {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            match url {
                "https://index.test/osmosis/assetlist.json" => Ok(FetchResponse {
                    status: 200,
                    body: r#"{"chain_name":"osmosis","assets":[]}"#.to_string(),
                }),
                "https://index.test/down/assetlist.json" => Err(FetchError::Transport {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                }),
                _ => Ok(FetchResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_hosted_source_skips_failing_chains() {
        let source = HostedIndexSource::new(
            Arc::new(Index),
            "https://index.test/",
            vec!["down".to_string(), "osmosis".to_string(), "missing".to_string()],
        );

        let loaded = source
            .load_documents(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].origin, "osmosis/assetlist.json");
        assert!(loaded.pending_revision.is_none());
    }

    #[tokio::test]
    async fn test_hosted_source_stops_when_cancelled() {
        let source = HostedIndexSource::new(Arc::new(Index), "https://index.test", vec!["osmosis".to_string()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source.load_documents(&cancel).await;
        assert!(matches!(result, Err(SourceError::Cancelled(_))));
    }
}
