//! # Registry Mirror
//!
//! Keeps a local copy of the chain registry and decides when it needs
//! refreshing.
//!
//! ## Refresh decision
//!
//! [`MirrorTracker::ensure_fresh`] compares the upstream branch head with the
//! revision marker persisted by the last *completed* run:
//!
//! - same revision and a mirror on disk: nothing to do
//! - mirror missing: clone
//! - otherwise: pull
//!
//! A failed clone/pull is retried once by deleting the mirror and cloning from
//! scratch. The tracker never writes the marker itself; it hands the new
//! revision back in [`MirrorStatus::pending_revision`] and the sync
//! orchestrator stores it once the catalog transaction has committed.

use crate::fetch::HttpFetch;
use crate::store::RevisionStore;
use crate::types::AssetDocument;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

/// Name of the per-chain asset document inside each registry directory
pub const ASSET_LIST_FILE: &str = "assetlist.json";

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("mirror I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine upstream revision: {0}")]
    Revision(String),
}

/// Local mirror operations.
#[async_trait]
pub trait MirrorRepo: Send + Sync {
    async fn exists(&self, local: &Path) -> bool;
    async fn clone_repo(&self, remote: &str, local: &Path) -> Result<(), MirrorError>;
    async fn pull(&self, local: &Path) -> Result<(), MirrorError>;
    async fn remove(&self, local: &Path) -> Result<(), MirrorError>;
    /// Asset documents of every first-level directory, ordered by directory name.
    async fn list_tree(&self, local: &Path) -> Result<Vec<AssetDocument>, MirrorError>;
}

/// [`MirrorRepo`] backed by the `git` command line.
pub struct GitMirror {
    branch: String,
}

impl GitMirror {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<(), MirrorError> {
        let command = format!("git {}", args.join(" "));
        debug!("MirrorRepo: running {}", command);

        let output = Command::new("git")
            .args(args)
            .output()
            .await
            .map_err(|e| MirrorError::Command {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MirrorError::Command {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorRepo for GitMirror {
    async fn exists(&self, local: &Path) -> bool {
        tokio::fs::try_exists(local.join(".git")).await.unwrap_or(false)
    }

    async fn clone_repo(&self, remote: &str, local: &Path) -> Result<(), MirrorError> {
        let local = local.to_string_lossy();
        self.git(&["clone", "--depth", "1", "--branch", &self.branch, remote, &local])
            .await
    }

    async fn pull(&self, local: &Path) -> Result<(), MirrorError> {
        // Shallow mirror: fetch the branch head and move onto it
        let local = local.to_string_lossy();
        self.git(&["-C", &local, "fetch", "--depth", "1", "origin", &self.branch])
            .await?;
        self.git(&["-C", &local, "reset", "--hard", "FETCH_HEAD"]).await
    }

    async fn remove(&self, local: &Path) -> Result<(), MirrorError> {
        match tokio::fs::remove_dir_all(local).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MirrorError::Io {
                path: local.to_path_buf(),
                source,
            }),
        }
    }

    async fn list_tree(&self, local: &Path) -> Result<Vec<AssetDocument>, MirrorError> {
        let io_err = |source| MirrorError::Io {
            path: local.to_path_buf(),
            source,
        };

        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(local).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push((name, entry.path()));
            }
        }
        dirs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut documents = Vec::with_capacity(dirs.len());
        for (_, dir) in dirs {
            let path = dir.join(ASSET_LIST_FILE);
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => documents.push(AssetDocument {
                    origin: path.to_string_lossy().to_string(),
                    contents,
                }),
                // Not every directory is a chain (e.g. `_IBC`, `testnets`)
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("⚠️ MirrorRepo: skipping unreadable {}: {}", path.display(), e),
            }
        }
        Ok(documents)
    }
}

/// Outcome of [`MirrorTracker::ensure_fresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorStatus {
    pub refreshed: bool,
    /// Upstream revision to record once the run commits
    pub pending_revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchHead {
    sha: String,
}

pub struct MirrorTracker {
    fetcher: Arc<dyn HttpFetch>,
    repo: Arc<dyn MirrorRepo>,
    revisions: Arc<dyn RevisionStore>,
    remote_url: String,
    revision_url: String,
    local_path: PathBuf,
}

impl MirrorTracker {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        repo: Arc<dyn MirrorRepo>,
        revisions: Arc<dyn RevisionStore>,
        remote_url: impl Into<String>,
        revision_url: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            repo,
            revisions,
            remote_url: remote_url.into(),
            revision_url: revision_url.into(),
            local_path: local_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn repo(&self) -> &Arc<dyn MirrorRepo> {
        &self.repo
    }

    async fn upstream_revision(&self) -> Result<String, MirrorError> {
        let body = self
            .fetcher
            .get_ok(&self.revision_url)
            .await
            .map_err(|e| MirrorError::Revision(e.to_string()))?;
        let head: BranchHead =
            serde_json::from_str(&body).map_err(|e| MirrorError::Revision(e.to_string()))?;
        Ok(head.sha)
    }

    pub async fn ensure_fresh(&self) -> Result<MirrorStatus, MirrorError> {
        let upstream = match self.upstream_revision().await {
            Ok(rev) => Some(rev),
            Err(e) => {
                warn!("⚠️ MirrorTracker: {} (continuing with local mirror)", e);
                None
            }
        };

        let marker = match self.revisions.get().await {
            Ok(marker) => marker,
            Err(e) => {
                warn!("⚠️ MirrorTracker: could not read revision marker: {}", e);
                None
            }
        };

        let exists = self.repo.exists(&self.local_path).await;

        match upstream {
            Some(rev) if exists && marker.as_deref() == Some(rev.as_str()) => {
                debug!("MirrorTracker: mirror already at {}", rev);
                Ok(MirrorStatus {
                    refreshed: false,
                    pending_revision: None,
                })
            }
            Some(rev) => {
                info!(
                    "MirrorTracker: upstream at {} (last synced: {}), refreshing mirror",
                    rev,
                    marker.as_deref().unwrap_or("never")
                );
                self.refresh(exists).await?;
                Ok(MirrorStatus {
                    refreshed: true,
                    pending_revision: Some(rev),
                })
            }
            None if exists => Ok(MirrorStatus {
                refreshed: false,
                pending_revision: None,
            }),
            None => {
                // Nothing to fall back on: try to clone anyway
                self.refresh(false).await?;
                Ok(MirrorStatus {
                    refreshed: true,
                    pending_revision: None,
                })
            }
        }
    }

    async fn refresh(&self, exists: bool) -> Result<(), MirrorError> {
        let first_attempt = if exists {
            self.repo.pull(&self.local_path).await
        } else {
            self.repo.clone_repo(&self.remote_url, &self.local_path).await
        };

        if let Err(e) = first_attempt {
            warn!("⚠️ MirrorTracker: {} - retrying with a fresh clone", e);
            self.repo.remove(&self.local_path).await?;
            self.repo
                .clone_repo(&self.remote_url, &self.local_path)
                .await?;
        }

        info!("✅ MirrorTracker: mirror ready at {}", self.local_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResponse};
    use crate::memory_store::MemoryStore;
    use std::sync::Mutex;

    struct RevisionEndpoint(Option<&'static str>);

    #[async_trait]
    impl HttpFetch for RevisionEndpoint {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            match self.0 {
                Some(sha) => Ok(FetchResponse {
                    status: 200,
                    body: format!(r#"{{"sha":"{}","commit":{{}}}}"#, sha),
                }),
                None => Err(FetchError::Transport {
                    url: url.to_string(),
                    reason: "offline".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeRepo {
        exists: bool,
        fail_pull: bool,
        fail_clone: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeRepo {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MirrorRepo for FakeRepo {
        async fn exists(&self, _local: &Path) -> bool {
            self.exists
        }
        async fn clone_repo(&self, _remote: &str, _local: &Path) -> Result<(), MirrorError> {
            self.calls.lock().unwrap().push("clone");
            if self.fail_clone {
                return Err(MirrorError::Command {
                    command: "git clone".to_string(),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }
        async fn pull(&self, _local: &Path) -> Result<(), MirrorError> {
            self.calls.lock().unwrap().push("pull");
            if self.fail_pull {
                return Err(MirrorError::Command {
                    command: "git fetch".to_string(),
                    stderr: "diverged".to_string(),
                });
            }
            Ok(())
        }
        async fn remove(&self, _local: &Path) -> Result<(), MirrorError> {
            self.calls.lock().unwrap().push("remove");
            Ok(())
        }
        async fn list_tree(&self, _local: &Path) -> Result<Vec<AssetDocument>, MirrorError> {
            Ok(vec![])
        }
    }

    async fn tracker(
        upstream: Option<&'static str>,
        marker: Option<&str>,
        repo: Arc<FakeRepo>,
    ) -> MirrorTracker {
        let store = MemoryStore::new();
        if let Some(marker) = marker {
            store.set(marker).await.unwrap();
        }
        MirrorTracker::new(
            Arc::new(RevisionEndpoint(upstream)),
            repo,
            Arc::new(store),
            "https://example.invalid/registry.git",
            "https://example.invalid/head",
            "registry",
        )
    }

    #[tokio::test]
    async fn test_same_revision_is_noop() {
        let repo = Arc::new(FakeRepo { exists: true, ..Default::default() });
        let status = tracker(Some("abc"), Some("abc"), repo.clone())
            .await
            .ensure_fresh()
            .await
            .unwrap();
        assert!(!status.refreshed);
        assert_eq!(status.pending_revision, None);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_mirror_is_cloned_and_revision_left_pending() {
        let repo = Arc::new(FakeRepo::default());
        let t = tracker(Some("def"), None, repo.clone()).await;
        let status = t.ensure_fresh().await.unwrap();
        assert!(status.refreshed);
        assert_eq!(status.pending_revision.as_deref(), Some("def"));
        assert_eq!(repo.calls(), vec!["clone"]);
        // marker is not written by the tracker
        assert_eq!(t.revisions.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_new_revision_pulls_existing_mirror() {
        let repo = Arc::new(FakeRepo { exists: true, ..Default::default() });
        let status = tracker(Some("new"), Some("old"), repo.clone())
            .await
            .ensure_fresh()
            .await
            .unwrap();
        assert!(status.refreshed);
        assert_eq!(repo.calls(), vec!["pull"]);
    }

    #[tokio::test]
    async fn test_failed_pull_falls_back_to_reclone() {
        let repo = Arc::new(FakeRepo {
            exists: true,
            fail_pull: true,
            ..Default::default()
        });
        let status = tracker(Some("new"), Some("old"), repo.clone())
            .await
            .ensure_fresh()
            .await
            .unwrap();
        assert!(status.refreshed);
        assert_eq!(repo.calls(), vec!["pull", "remove", "clone"]);
    }

    #[tokio::test]
    async fn test_failed_reclone_aborts() {
        let repo = Arc::new(FakeRepo {
            exists: true,
            fail_pull: true,
            fail_clone: true,
            ..Default::default()
        });
        let result = tracker(Some("new"), Some("old"), repo.clone())
            .await
            .ensure_fresh()
            .await;
        assert!(matches!(result, Err(MirrorError::Command { .. })));
        assert_eq!(repo.calls(), vec!["pull", "remove", "clone"]);
    }

    #[tokio::test]
    async fn test_offline_revision_lookup_uses_existing_mirror() {
        let repo = Arc::new(FakeRepo { exists: true, ..Default::default() });
        let status = tracker(None, Some("old"), repo.clone())
            .await
            .ensure_fresh()
            .await
            .unwrap();
        assert!(!status.refreshed);
        assert_eq!(status.pending_revision, None);
        assert!(repo.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_tree_reads_first_level_asset_lists_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for chain in ["osmosis", "cosmoshub"] {
            std::fs::create_dir(root.join(chain)).unwrap();
            std::fs::write(root.join(chain).join(ASSET_LIST_FILE), format!("{{\"c\":\"{}\"}}", chain))
                .unwrap();
        }
        // no asset list, hidden dir, nested list: all ignored
        std::fs::create_dir(root.join("_IBC")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git").join(ASSET_LIST_FILE), "{}").unwrap();
        std::fs::create_dir_all(root.join("testnets").join("osmosistestnet")).unwrap();
        std::fs::write(
            root.join("testnets").join("osmosistestnet").join(ASSET_LIST_FILE),
            "{}",
        )
        .unwrap();

        let docs = GitMirror::new("master").list_tree(root).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].origin.contains("cosmoshub"));
        assert!(docs[1].contents.contains("osmosis"));
    }
}
