use crate::settings::Database as DatabaseSettings;
use crate::store::{CatalogStore, CatalogTransaction, RevisionStore, StoreError};
use crate::types::{CatalogEntry, CatalogRecord};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row, Transaction};
use std::env;
use std::time::Duration;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "token_catalog";

/// `sync_state` key holding the last fully synced registry revision
const REVISION_KEY: &str = "registry_revision";

const CATALOG_COLUMNS: &str = "id, denom, symbol, price, liquidity, volume_24h, volume_24h_change, \
     price_24h_change, price_7d_change, exponent, display, name";

pub async fn connect(settings: &DatabaseSettings) -> Result<PgStore> {
    // Force UTF-8 client encoding to avoid sqlx issues with non-ASCII server messages
    env::set_var("PGCLIENTENCODING", "UTF8");

    let database_url = settings
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set (or database.url in Config.toml)"))?;

    // Retries with exponential backoff to survive DNS/startup races in Compose
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(PgStore::new(pool));
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        let delay_ms = (1u64 << attempt.min(6)) * 200; // 400ms, 800ms, ... capped at ~12.8s
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x544F4B454E53594E; // "TOKENSYN" in hex

    let mut tx = pool.begin().await?;

    log::info!("Acquiring database migration lock...");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(&mut *tx)
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(&mut *tx)
        .await?;

    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("✅ Database schema ready ({}).", SCHEMA);

    Ok(())
}

async fn create_tables(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.tokens (
            id BIGSERIAL PRIMARY KEY,
            denom TEXT UNIQUE NOT NULL,
            symbol TEXT UNIQUE NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            liquidity DOUBLE PRECISION NOT NULL DEFAULT 0,
            volume_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
            volume_24h_change DOUBLE PRECISION NOT NULL DEFAULT 0,
            price_24h_change DOUBLE PRECISION NOT NULL DEFAULT 0,
            price_7d_change DOUBLE PRECISION NOT NULL DEFAULT 0,
            exponent INTEGER NOT NULL,
            display TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ DEFAULT NOW(),
            updated_at TIMESTAMPTZ DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(&mut **tx)
    .await?;

    // Lookups are case-insensitive, so uniqueness is too
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_symbol_lower ON {}.tokens (LOWER(symbol))",
        SCHEMA
    ))
    .execute(&mut **tx)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.sync_state (
            key VARCHAR(64) PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn row_to_entry(row: &PgRow) -> Result<CatalogEntry, sqlx::Error> {
    Ok(CatalogEntry {
        id: row.try_get("id")?,
        denom: row.try_get("denom")?,
        symbol: row.try_get("symbol")?,
        price: row.try_get("price")?,
        liquidity: row.try_get("liquidity")?,
        volume_24h: row.try_get("volume_24h")?,
        volume_24h_change: row.try_get("volume_24h_change")?,
        price_24h_change: row.try_get("price_24h_change")?,
        price_7d_change: row.try_get("price_7d_change")?,
        exponent: row.try_get("exponent")?,
        display: row.try_get("display")?,
        name: row.try_get("name")?,
    })
}

/// Catalog and revision marker backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevisionStore for PgStore {
    async fn get(&self) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT value FROM {}.sync_state WHERE key = $1",
            SCHEMA
        ))
        .bind(REVISION_KEY)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, revision: &str) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {}.sync_state (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            SCHEMA
        ))
        .bind(REVISION_KEY)
        .bind(revision)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_by_symbols(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<CatalogEntry>, StoreError> {
        let rows = match symbols {
            Some(symbols) => {
                let lowered: Vec<String> = symbols.iter().map(|s| s.to_lowercase()).collect();
                sqlx::query(&format!(
                    "SELECT {} FROM {}.tokens WHERE LOWER(symbol) = ANY($1) ORDER BY id",
                    CATALOG_COLUMNS, SCHEMA
                ))
                .bind(lowered)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM {}.tokens ORDER BY id",
                    CATALOG_COLUMNS, SCHEMA
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| row_to_entry(row).map_err(StoreError::from))
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTransaction for PgTransaction {
    async fn find_by_denom(&mut self, denom: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {}.tokens WHERE denom = $1",
            CATALOG_COLUMNS, SCHEMA
        ))
        .bind(denom)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_entry).transpose()?)
    }

    async fn find_by_symbol(&mut self, symbol: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {}.tokens WHERE LOWER(symbol) = LOWER($1)",
            CATALOG_COLUMNS, SCHEMA
        ))
        .bind(symbol)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_entry).transpose()?)
    }

    async fn update(&mut self, id: i64, record: &CatalogRecord) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {}.tokens SET
                denom = $2, symbol = $3, price = $4, liquidity = $5, volume_24h = $6,
                volume_24h_change = $7, price_24h_change = $8, price_7d_change = $9,
                exponent = $10, display = $11, name = $12, updated_at = NOW()
             WHERE id = $1",
            SCHEMA
        ))
        .bind(id)
        .bind(&record.denom)
        .bind(&record.symbol)
        .bind(record.price)
        .bind(record.liquidity)
        .bind(record.volume_24h)
        .bind(record.volume_24h_change)
        .bind(record.price_24h_change)
        .bind(record.price_7d_change)
        .bind(record.exponent)
        .bind(&record.display)
        .bind(&record.name)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(id));
        }
        Ok(())
    }

    async fn insert(&mut self, record: &CatalogRecord) -> Result<i64, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO {}.tokens
                (denom, symbol, price, liquidity, volume_24h, volume_24h_change,
                 price_24h_change, price_7d_change, exponent, display, name)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id",
            SCHEMA
        ))
        .bind(&record.denom)
        .bind(&record.symbol)
        .bind(record.price)
        .bind(record.liquidity)
        .bind(record.volume_24h)
        .bind(record.volume_24h_change)
        .bind(record.price_24h_change)
        .bind(record.price_7d_change)
        .bind(record.exponent)
        .bind(&record.display)
        .bind(&record.name)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
