//! # Catalog & Revision Storage
//!
//! The pipeline talks to persistence only through these traits. Two
//! implementations ship with the crate:
//!
//! - [`crate::database::PgStore`]: PostgreSQL via `sqlx` (production)
//! - [`crate::memory_store::MemoryStore`]: in-process, used by tests and dry runs
//!
//! Writes happen inside a [`CatalogTransaction`]; nothing a transaction does is
//! visible to [`CatalogStore::find_by_symbols`] until `commit` returns `Ok`.

use crate::types::{CatalogEntry, CatalogRecord};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("no catalog row with id {0}")]
    MissingRow(i64),
}

/// Single persisted scalar: the last upstream revision fully synced.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>, StoreError>;
    async fn set(&self, revision: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Committed rows whose symbol matches one of `symbols` case-insensitively.
    /// `None` returns the whole catalog.
    async fn find_by_symbols(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<CatalogEntry>, StoreError>;

    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, StoreError>;
}

/// Unit of work over the catalog. Dropping it without `commit` discards it.
#[async_trait]
pub trait CatalogTransaction: Send {
    async fn find_by_denom(&mut self, denom: &str) -> Result<Option<CatalogEntry>, StoreError>;

    /// Case-insensitive symbol lookup, seeing this transaction's own writes.
    async fn find_by_symbol(&mut self, symbol: &str) -> Result<Option<CatalogEntry>, StoreError>;

    async fn update(&mut self, id: i64, record: &CatalogRecord) -> Result<(), StoreError>;

    /// Returns the new row id.
    async fn insert(&mut self, record: &CatalogRecord) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Splits a comma-delimited symbol filter into lowercase symbols.
/// Blank input (or only separators) means "no filter".
pub fn parse_symbol_filter(filter: Option<&str>) -> Option<Vec<String>> {
    let symbols: Vec<String> = filter?
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if symbols.is_empty() {
        None
    } else {
        Some(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbol_filter() {
        assert_eq!(parse_symbol_filter(None), None);
        assert_eq!(parse_symbol_filter(Some("")), None);
        assert_eq!(parse_symbol_filter(Some(" , ,")), None);
        assert_eq!(
            parse_symbol_filter(Some("ATOM, osmo,,Juno")),
            Some(vec!["atom".to_string(), "osmo".to_string(), "juno".to_string()])
        );
    }
}
