//! # Candidate Deduplication
//!
//! Candidates are keyed two ways (stable id and denom) and the registry lists
//! the same asset several times: once natively on its home chain and once per
//! chain it was bridged to. Dedup is order-sensitive, first seen wins.
//!
//! 1. **Native pass** over non-cross-chain candidates: keep a candidate when
//!    both its stable id and its denom are new.
//! 2. **Cross-chain pass** over cross-chain candidates: keep a candidate when
//!    no native candidate claimed its stable id and its denom is new.
//!
//! Pass 2 does not check stable ids against *other* cross-chain candidates,
//! so two bridged copies of an asset with no native listing both survive.
//! Known gap; the reconciler's symbol guard stops them from colliding in the
//! catalog.

use crate::settings::SeedToken;
use crate::types::CandidateToken;
use indexmap::IndexMap;
use log::debug;
use std::collections::HashSet;

pub fn dedupe(candidates: Vec<CandidateToken>) -> Vec<CandidateToken> {
    let total = candidates.len();
    let mut seen_stable_ids: HashSet<String> = HashSet::new();
    let mut seen_denoms: HashSet<String> = HashSet::new();
    let mut native: IndexMap<String, CandidateToken> = IndexMap::new();
    let mut cross_chain: Vec<CandidateToken> = Vec::new();

    let (native_candidates, cross_chain_candidates): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|c| !c.is_cross_chain());

    for candidate in native_candidates {
        if seen_stable_ids.contains(&candidate.stable_id) || seen_denoms.contains(&candidate.denom)
        {
            continue;
        }
        seen_stable_ids.insert(candidate.stable_id.clone());
        seen_denoms.insert(candidate.denom.clone());
        native.insert(candidate.stable_id.clone(), candidate);
    }

    for candidate in cross_chain_candidates {
        if native.contains_key(&candidate.stable_id) || seen_denoms.contains(&candidate.denom) {
            continue;
        }
        seen_denoms.insert(candidate.denom.clone());
        cross_chain.push(candidate);
    }

    let mut kept: Vec<CandidateToken> = native.into_values().collect();
    kept.extend(cross_chain);

    debug!("Deduplicator: kept {}/{} candidates", kept.len(), total);
    kept
}

/// Append seed tokens after dedup. Seeds are not checked against anything.
pub fn append_seeds(mut candidates: Vec<CandidateToken>, seeds: &[SeedToken]) -> Vec<CandidateToken> {
    candidates.extend(seeds.iter().map(|seed| {
        CandidateToken::new(
            seed.denom.clone(),
            seed.exponent,
            seed.name.clone(),
            seed.display.clone(),
            seed.stable_id.clone(),
        )
    }));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(denom: &str, stable_id: &str) -> CandidateToken {
        CandidateToken::new(denom, 6, stable_id, denom, stable_id)
    }

    fn denoms(tokens: &[CandidateToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.denom.as_str()).collect()
    }

    #[test]
    fn test_native_duplicate_stable_id_keeps_first() {
        let kept = dedupe(vec![token("uatom", "cosmos"), token("uatom2", "cosmos")]);
        assert_eq!(denoms(&kept), vec!["uatom"]);
    }

    #[test]
    fn test_native_duplicate_denom_keeps_first() {
        let kept = dedupe(vec![token("uosmo", "osmosis"), token("uosmo", "osmosis-alt")]);
        assert_eq!(denoms(&kept), vec!["uosmo"]);
    }

    #[test]
    fn test_stable_id_not_claimed_by_rejected_denom() {
        // ("ua", "b") loses on denom, so ("ub", "b") is still the first to claim "b"
        let kept = dedupe(vec![token("ua", "a"), token("ua", "b"), token("ub", "b")]);
        assert_eq!(denoms(&kept), vec!["ua", "ub"]);
    }

    #[test]
    fn test_cross_chain_excluded_when_native_has_stable_id() {
        let kept = dedupe(vec![
            token("ibc/AAA", "cosmos"),
            token("uatom", "cosmos"),
        ]);
        // native pass runs first regardless of input position
        assert_eq!(denoms(&kept), vec!["uatom"]);
    }

    #[test]
    fn test_cross_chain_duplicates_without_native_both_survive() {
        let kept = dedupe(vec![
            token("ibc/AAA", "wrapped-bitcoin"),
            token("ibc/BBB", "wrapped-bitcoin"),
        ]);
        assert_eq!(denoms(&kept), vec!["ibc/AAA", "ibc/BBB"]);
    }

    #[test]
    fn test_cross_chain_same_denom_keeps_first() {
        let kept = dedupe(vec![token("ibc/AAA", "x"), token("IBC/AAA", "y"), token("ibc/AAA", "z")]);
        assert_eq!(denoms(&kept), vec!["ibc/AAA", "IBC/AAA"]);
    }

    #[test]
    fn test_output_is_natives_then_cross_chain() {
        let kept = dedupe(vec![
            token("ibc/JUNO", "juno-network"),
            token("uosmo", "osmosis"),
            token("ibc/ATOM", "cosmos"),
            token("uatom", "cosmos"),
        ]);
        assert_eq!(denoms(&kept), vec!["uosmo", "uatom", "ibc/JUNO"]);
    }

    #[test]
    fn test_seeds_appended_without_dedup() {
        let seeds = vec![SeedToken {
            denom: "uosmo".to_string(),
            stable_id: "osmosis".to_string(),
            name: "Osmosis".to_string(),
            display: "osmo".to_string(),
            exponent: 6,
        }];
        let out = append_seeds(dedupe(vec![token("uosmo", "osmosis")]), &seeds);
        assert_eq!(denoms(&out), vec!["uosmo", "uosmo"]);
    }
}
