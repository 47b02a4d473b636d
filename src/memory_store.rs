//! In-process catalog and revision store.
//!
//! A transaction works on a private copy of the committed snapshot and swaps
//! it in on commit, so readers only ever see committed state. Unique
//! `denom`/`symbol` constraints are checked at commit time like a relational
//! store would.

use crate::store::{CatalogStore, CatalogTransaction, RevisionStore, StoreError};
use crate::types::{CatalogEntry, CatalogRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    rows: BTreeMap<i64, CatalogEntry>,
    next_id: i64,
}

impl Snapshot {
    fn check_unique(&self) -> Result<(), StoreError> {
        let mut denoms = HashSet::new();
        let mut symbols = HashSet::new();
        for row in self.rows.values() {
            if !denoms.insert(row.denom.as_str()) {
                return Err(StoreError::Constraint(format!("duplicate denom {}", row.denom)));
            }
            if !symbols.insert(row.symbol.to_lowercase()) {
                return Err(StoreError::Constraint(format!("duplicate symbol {}", row.symbol)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Snapshot>>,
    revision: Arc<RwLock<Option<String>>>,
    fail_next_commit: Arc<AtomicBool>,
    /// Countdown to an injected write failure; 0 disables it
    fail_write_at: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail, as if the database dropped the connection.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the `n`th `update`/`insert` from now fail (1 = the next one).
    pub fn fail_nth_write(&self, n: usize) {
        self.fail_write_at.store(n, Ordering::SeqCst);
    }

    /// Committed rows ordered by id.
    pub async fn rows(&self) -> Vec<CatalogEntry> {
        self.committed.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self.revision.read().await.clone())
    }

    async fn set(&self, revision: &str) -> Result<(), StoreError> {
        *self.revision.write().await = Some(revision.to_string());
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_by_symbols(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<CatalogEntry>, StoreError> {
        let snapshot = self.committed.read().await;
        let wanted: Option<HashSet<String>> =
            symbols.map(|list| list.iter().map(|s| s.to_lowercase()).collect());

        Ok(snapshot
            .rows
            .values()
            .filter(|row| match &wanted {
                Some(set) => set.contains(&row.symbol.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, StoreError> {
        let working = self.committed.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            working,
            committed: Arc::clone(&self.committed),
            fail_commit: Arc::clone(&self.fail_next_commit),
            fail_write_at: Arc::clone(&self.fail_write_at),
        }))
    }
}

pub struct MemoryTransaction {
    working: Snapshot,
    committed: Arc<RwLock<Snapshot>>,
    fail_commit: Arc<AtomicBool>,
    fail_write_at: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn check_write(&self) -> Result<(), StoreError> {
        let previous = self
            .fail_write_at
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            return Err(StoreError::Constraint("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn find_by_denom(&mut self, denom: &str) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self.working.rows.values().find(|row| row.denom == denom).cloned())
    }

    async fn find_by_symbol(&mut self, symbol: &str) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self
            .working
            .rows
            .values()
            .find(|row| row.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn update(&mut self, id: i64, record: &CatalogRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let row = self
            .working
            .rows
            .get_mut(&id)
            .ok_or(StoreError::MissingRow(id))?;
        *row = record.clone().into_entry(id);
        Ok(())
    }

    async fn insert(&mut self, record: &CatalogRecord) -> Result<i64, StoreError> {
        self.check_write()?;
        self.working.next_id += 1;
        let id = self.working.next_id;
        self.working.rows.insert(id, record.clone().into_entry(id));
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            working,
            committed,
            fail_commit,
            ..
        } = *self;

        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Commit("injected commit failure".to_string()));
        }
        working.check_unique()?;
        *committed.write().await = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(denom: &str, symbol: &str, price: f64) -> CatalogRecord {
        CatalogRecord {
            denom: denom.to_string(),
            symbol: symbol.to_string(),
            price,
            liquidity: 0.0,
            volume_24h: 0.0,
            volume_24h_change: 0.0,
            price_24h_change: 0.0,
            price_7d_change: 0.0,
            exponent: 6,
            display: symbol.to_lowercase(),
            name: symbol.to_string(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();

        assert!(store.find_by_symbols(None).await.unwrap().is_empty());
        tx.commit().await.unwrap();
        assert_eq!(store.find_by_symbols(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_enforces_unique_symbol() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();
        tx.insert(&record("ibc/ATOM", "atom", 8.4)).await.unwrap();

        assert!(matches!(tx.commit().await, Err(StoreError::Constraint(_))));
        assert!(store.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Commit(_))));

        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_symbols_is_case_insensitive() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("uatom", "ATOM", 8.5)).await.unwrap();
        tx.insert(&record("uosmo", "osmo", 0.75)).await.unwrap();
        tx.commit().await.unwrap();

        let filter = vec!["atom".to_string(), "OSMO".to_string()];
        assert_eq!(store.find_by_symbols(Some(&filter)).await.unwrap().len(), 2);
        let filter = vec!["Atom".to_string()];
        let rows = store.find_by_symbols(Some(&filter)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].denom, "uatom");
    }
}
