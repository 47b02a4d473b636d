use crate::cancel::{checkpoint, Cancelled};
use crate::fetch::{FetchError, HttpFetch};
use crate::settings::Market;
use crate::types::{CandidateToken, EnrichedToken, MarketFields, MarketRecord};
use indexmap::IndexSet;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pack ids into comma-joined query strings no longer than `max_len` and
/// holding at most `max_ids` ids (one result page).
///
/// Ids are taken in order; an id that would push the open batch past either
/// ceiling starts a new batch. A single id longer than `max_len` gets a batch
/// of its own.
pub fn pack_batches<S: AsRef<str>>(ids: &[S], max_len: usize, max_ids: usize) -> Vec<String> {
    let max_ids = max_ids.max(1);
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for id in ids {
        let id = id.as_ref();
        if count == 0 {
            current.push_str(id);
        } else if count >= max_ids || current.len() + 1 + id.len() > max_len {
            batches.push(std::mem::take(&mut current));
            current.push_str(id);
            count = 0;
        } else {
            current.push(',');
            current.push_str(id);
        }
        count += 1;
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Result of enriching one run's candidates.
#[derive(Debug, Clone, Default)]
pub struct EnrichOutcome {
    pub tokens: Vec<EnrichedToken>,
    pub batches: usize,
    pub failed_batches: usize,
    /// Candidates dropped for lack of a usable price or symbol
    pub dropped: usize,
}

/// Joins candidates with market data from a CoinGecko-style `/coins/markets`
/// endpoint.
pub struct PriceEnricher {
    fetcher: Arc<dyn HttpFetch>,
    base_url: String,
    vs_currency: String,
    max_query_len: usize,
    max_ids_per_batch: usize,
}

impl PriceEnricher {
    pub fn new(fetcher: Arc<dyn HttpFetch>, settings: &Market) -> Self {
        Self {
            fetcher,
            base_url: settings.base_url.clone(),
            vs_currency: settings.vs_currency.clone(),
            max_query_len: settings.max_query_len,
            max_ids_per_batch: settings.max_ids_per_batch.max(1),
        }
    }

    fn batch_url(&self, ids: &str) -> Result<String, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::Transport {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("vs_currency", &self.vs_currency)
            .append_pair("ids", ids)
            .append_pair("price_change_percentage", "7d")
            .append_pair("per_page", &self.max_ids_per_batch.to_string());
        Ok(url.to_string())
    }

    async fn fetch_batch(&self, ids: &str) -> Result<Vec<MarketRecord>, FetchError> {
        let url = self.batch_url(ids)?;
        let body = self.fetcher.get_ok(&url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    pub async fn enrich(
        &self,
        candidates: Vec<CandidateToken>,
        cancel: &CancellationToken,
    ) -> Result<EnrichOutcome, Cancelled> {
        let ids: IndexSet<&str> = candidates
            .iter()
            .map(|c| c.stable_id.as_str())
            .collect();
        let ids: Vec<&str> = ids.into_iter().collect();
        let batches = pack_batches(&ids, self.max_query_len, self.max_ids_per_batch);

        let mut records: Vec<MarketRecord> = Vec::new();
        let mut failed_batches = 0usize;

        // One request at a time
        for (i, batch) in batches.iter().enumerate() {
            checkpoint(cancel)?;
            match self.fetch_batch(batch).await {
                Ok(batch_records) => {
                    debug!(
                        "PriceEnricher: batch {}/{} returned {} records",
                        i + 1,
                        batches.len(),
                        batch_records.len()
                    );
                    records.extend(batch_records);
                }
                Err(e) => {
                    failed_batches += 1;
                    warn!(
                        "⚠️ PriceEnricher: batch {}/{} failed: {}",
                        i + 1,
                        batches.len(),
                        e
                    );
                }
            }
        }

        let total = candidates.len();
        let tokens = join(candidates, &records);
        let dropped = total - tokens.len();

        info!(
            "PriceEnricher: priced {}/{} candidates ({} batches, {} failed)",
            tokens.len(),
            total,
            batches.len(),
            failed_batches
        );

        Ok(EnrichOutcome {
            tokens,
            batches: batches.len(),
            failed_batches,
            dropped,
        })
    }
}

/// Join candidates with market records by stable id. Candidates with no
/// record, no usable price, or no symbol are dropped.
pub fn join(candidates: Vec<CandidateToken>, records: &[MarketRecord]) -> Vec<EnrichedToken> {
    let mut by_id: HashMap<&str, &MarketRecord> = HashMap::with_capacity(records.len());
    for record in records {
        by_id.entry(record.id.as_str()).or_insert(record);
    }

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let record = by_id.get(candidate.stable_id.as_str())?;
            let price = record.usable_price()?;
            let symbol = record
                .symbol
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())?
                .to_uppercase();

            Some(EnrichedToken {
                denom: candidate.denom,
                exponent: candidate.exponent,
                name: candidate.name,
                display: candidate.display,
                origin: candidate.origin,
                symbol,
                price,
                market: MarketFields {
                    price_24h_change: record.price_change_percentage_24h.unwrap_or(0.0),
                    price_7d_change: record
                        .price_change_percentage_7d_in_currency
                        .unwrap_or(0.0),
                    volume_24h: record.total_volume.unwrap_or(0.0),
                    ..candidate.market
                },
            })
        })
        .collect()
}
