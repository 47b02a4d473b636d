//! # Catalog Reconciler
//!
//! Writes one run's enriched tokens into the catalog inside a single
//! transaction. Rows are keyed by denom: an existing denom is updated in
//! place, a new one is inserted after every existing row has been handled.
//! Nothing is ever deleted.
//!
//! Records that would break the unique `denom`/`symbol` constraints are
//! skipped rather than failing the whole run:
//!
//! - a denom already written earlier in this run
//! - a symbol claimed by a different denom earlier in this run
//! - a symbol still owned by a different catalog row once every other record
//!   has been written
//!
//! Records wanting a symbol another row holds are deferred, not skipped
//! outright: that row may move off the symbol later in the same run, and rows
//! that simply trade symbols are resolved through temporary placeholders.

use crate::store::{CatalogStore, CatalogTransaction, StoreError};
use crate::types::{CatalogRecord, EnrichedToken};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub async fn reconcile(
    store: &dyn CatalogStore,
    tokens: &[EnrichedToken],
) -> Result<ReconcileSummary, StoreError> {
    let mut tx = store.begin().await?;

    match apply(tx.as_mut(), tokens).await {
        Ok(summary) => {
            tx.commit().await?;
            info!(
                "✅ Reconciler: committed {} created, {} updated, {} skipped",
                summary.created, summary.updated, summary.skipped
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("⚠️ Reconciler: rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Per-run bookkeeping shared by every pass over the records.
#[derive(Default)]
struct RunState<'a> {
    summary: ReconcileSummary,
    // lowercase symbol -> denom that claimed it this run
    claimed_symbols: HashMap<String, &'a str>,
    staged: Vec<CatalogRecord>,
}

impl<'a> RunState<'a> {
    async fn write(
        &mut self,
        tx: &mut dyn CatalogTransaction,
        token: &'a EnrichedToken,
    ) -> Result<(), StoreError> {
        self.claimed_symbols
            .insert(token.symbol.to_lowercase(), token.denom.as_str());
        let record = CatalogRecord::from(token);

        match tx.find_by_denom(&token.denom).await? {
            Some(existing) => {
                tx.update(existing.id, &record).await?;
                self.summary.updated += 1;
            }
            None => self.staged.push(record),
        }
        Ok(())
    }

    fn claimed_by(&self, token: &EnrichedToken) -> Option<&'a str> {
        self.claimed_symbols
            .get(&token.symbol.to_lowercase())
            .copied()
    }

    fn skip(&mut self, token: &EnrichedToken, reason: &str) {
        warn!(
            "⚠️ Reconciler: skipping {} ({}): {}",
            token.denom, token.symbol, reason
        );
        self.summary.skipped += 1;
    }
}

/// Denom of the row currently holding `token`'s symbol, unless it is
/// `token`'s own row.
async fn symbol_owner(
    tx: &mut dyn CatalogTransaction,
    token: &EnrichedToken,
) -> Result<Option<String>, StoreError> {
    Ok(tx
        .find_by_symbol(&token.symbol)
        .await?
        .map(|row| row.denom)
        .filter(|owner| *owner != token.denom))
}

async fn apply<'a>(
    tx: &mut dyn CatalogTransaction,
    tokens: &'a [EnrichedToken],
) -> Result<ReconcileSummary, StoreError> {
    let mut run = RunState::default();
    let mut handled_denoms: HashSet<&str> = HashSet::new();
    let mut deferred: Vec<&'a EnrichedToken> = Vec::new();

    for token in tokens {
        if !handled_denoms.insert(token.denom.as_str()) {
            run.skip(token, "denom seen twice this run");
            continue;
        }

        if let Some(owner) = run.claimed_by(token) {
            run.skip(token, &format!("symbol already claimed by {} this run", owner));
            continue;
        }

        // The owning row may move off this symbol later in the run
        if symbol_owner(tx, token).await?.is_some() {
            deferred.push(token);
            continue;
        }

        run.write(tx, token).await?;
    }

    retry_deferred(tx, &mut run, deferred).await?;

    for record in &run.staged {
        let id = tx.insert(record).await?;
        debug!("Reconciler: inserted {} ({}) as #{}", record.denom, record.symbol, id);
        run.summary.created += 1;
    }

    Ok(run.summary)
}

/// Retry records whose symbol belonged to another row, as long as a pass
/// makes progress. When stuck, rows that only want each other's symbols
/// (A: X -> Y, B: Y -> X) are parked on placeholder symbols once and retried
/// ahead of everything else.
async fn retry_deferred<'a>(
    tx: &mut dyn CatalogTransaction,
    run: &mut RunState<'a>,
    mut deferred: Vec<&'a EnrichedToken>,
) -> Result<(), StoreError> {
    let mut parked = false;

    while !deferred.is_empty() {
        let before = deferred.len();
        let mut waiting = Vec::with_capacity(before);

        for token in deferred {
            if let Some(owner) = run.claimed_by(token) {
                run.skip(token, &format!("symbol already claimed by {} this run", owner));
            } else if symbol_owner(tx, token).await?.is_some() {
                waiting.push(token);
            } else {
                run.write(tx, token).await?;
            }
        }

        deferred = waiting;
        if deferred.len() < before {
            continue;
        }
        if parked {
            break;
        }
        deferred = park_symbol_cycles(tx, deferred).await?;
        parked = true;
    }

    for token in deferred {
        run.skip(token, "symbol belongs to another denom");
    }
    Ok(())
}

/// Move every row that sits on an ownership cycle (each wants the symbol of
/// the next) to a unique placeholder symbol. Returns the records with cycle
/// members first, so records pointing into a cycle cannot take a member's
/// symbol.
async fn park_symbol_cycles<'a>(
    tx: &mut dyn CatalogTransaction,
    deferred: Vec<&'a EnrichedToken>,
) -> Result<Vec<&'a EnrichedToken>, StoreError> {
    let mut next: Vec<Option<usize>> = Vec::with_capacity(deferred.len());
    for token in &deferred {
        let owner = symbol_owner(tx, token).await?;
        next.push(owner.and_then(|denom| deferred.iter().position(|t| t.denom == denom)));
    }

    let in_cycle: Vec<bool> = (0..deferred.len())
        .map(|start| {
            let mut at = next[start];
            for _ in 0..deferred.len() {
                match at {
                    Some(i) if i == start => return true,
                    Some(i) => at = next[i],
                    None => return false,
                }
            }
            false
        })
        .collect();

    for (token, _) in deferred.iter().zip(&in_cycle).filter(|(_, member)| **member) {
        if let Some(row) = tx.find_by_denom(&token.denom).await? {
            let mut record = CatalogRecord::from(*token);
            record.symbol = format!("~{}", row.id);
            tx.update(row.id, &record).await?;
            debug!("Reconciler: parked {} on {} to free {}", token.denom, record.symbol, row.symbol);
        }
    }

    let (mut ordered, tails): (Vec<_>, Vec<_>) = deferred
        .into_iter()
        .zip(in_cycle)
        .partition(|(_, member)| *member);
    ordered.extend(tails);
    Ok(ordered.into_iter().map(|(token, _)| token).collect())
}
