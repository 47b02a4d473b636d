use crate::types::{Asset, AssetDocument, AssetList, CandidateToken};
use log::{debug, warn};

/// Denom used when an asset lists no exponent-0 unit
pub const UNKNOWN_DENOM: &str = "unknown";

/// Turn asset documents into candidate tokens, in document order.
///
/// Only assets carrying a cross-reference id (`coingecko_id`) are emitted.
/// Documents that fail to parse are logged and skipped.
pub fn extract(documents: &[AssetDocument]) -> Vec<CandidateToken> {
    let mut candidates = Vec::new();
    let mut skipped_documents = 0usize;

    for doc in documents {
        let list: AssetList = match serde_json::from_str(&doc.contents) {
            Ok(list) => list,
            Err(e) => {
                warn!("⚠️ Extractor: skipping malformed document {}: {}", doc.origin, e);
                skipped_documents += 1;
                continue;
            }
        };

        let before = candidates.len();
        candidates.extend(list.assets.iter().filter_map(candidate_from_asset));
        debug!(
            "Extractor: {} -> {} candidates (chain: {})",
            doc.origin,
            candidates.len() - before,
            list.chain_name.as_deref().unwrap_or("?")
        );
    }

    if skipped_documents > 0 {
        warn!(
            "⚠️ Extractor: {}/{} documents skipped",
            skipped_documents,
            documents.len()
        );
    }
    candidates
}

fn candidate_from_asset(asset: &Asset) -> Option<CandidateToken> {
    let stable_id = asset
        .coingecko_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())?;

    let denom = asset
        .denom_units
        .iter()
        .find(|unit| unit.exponent == 0)
        .map(|unit| unit.denom.as_str())
        .unwrap_or(UNKNOWN_DENOM);

    let exponent = asset
        .denom_units
        .iter()
        .map(|unit| unit.exponent)
        .max()
        .unwrap_or(0);

    Some(CandidateToken::new(
        denom,
        exponent,
        asset.name.clone().unwrap_or_default(),
        asset.display.clone().unwrap_or_default(),
        stable_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DenomOrigin;

    fn doc(origin: &str, contents: &str) -> AssetDocument {
        AssetDocument {
            origin: origin.to_string(),
            contents: contents.to_string(),
        }
    }

    const OSMOSIS: &str = r#"{
        "chain_name": "osmosis",
        "assets": [
            {
                "denom_units": [{"denom": "uosmo", "exponent": 0}, {"denom": "osmo", "exponent": 6}],
                "base": "uosmo", "name": "Osmosis", "display": "osmo", "symbol": "OSMO",
                "coingecko_id": "osmosis"
            },
            {
                "denom_units": [{"denom": "uion", "exponent": 0}, {"denom": "ion", "exponent": 6}],
                "base": "uion", "name": "Ion", "display": "ion", "symbol": "ION"
            },
            {
                "denom_units": [
                    {"denom": "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2", "exponent": 0, "aliases": ["uatom"]},
                    {"denom": "atom", "exponent": 6}
                ],
                "name": "Cosmos Hub Atom", "display": "atom", "symbol": "ATOM",
                "coingecko_id": "cosmos"
            },
            {
                "denom_units": [{"denom": "big", "exponent": 18}],
                "name": "No Base Unit", "display": "big", "coingecko_id": "no-base"
            }
        ]
    }"#;

    #[test]
    fn test_extracts_only_assets_with_stable_id() {
        let candidates = extract(&[doc("osmosis/assetlist.json", OSMOSIS)]);
        let ids: Vec<&str> = candidates.iter().map(|c| c.stable_id.as_str()).collect();
        assert_eq!(ids, vec!["osmosis", "cosmos", "no-base"]);
    }

    #[test]
    fn test_denom_exponent_and_origin() {
        let candidates = extract(&[doc("osmosis/assetlist.json", OSMOSIS)]);

        let osmo = &candidates[0];
        assert_eq!(osmo.denom, "uosmo");
        assert_eq!(osmo.exponent, 6);
        assert_eq!(osmo.display, "osmo");
        assert_eq!(osmo.origin, DenomOrigin::Native);

        let atom = &candidates[1];
        assert_eq!(atom.origin, DenomOrigin::CrossChain);
        assert_eq!(atom.exponent, 6);

        let no_base = &candidates[2];
        assert_eq!(no_base.denom, UNKNOWN_DENOM);
        assert_eq!(no_base.exponent, 18);
    }

    #[test]
    fn test_malformed_document_is_skipped() {
        let candidates = extract(&[
            doc("broken/assetlist.json", "{ not json"),
            doc("missing-assets/assetlist.json", r#"{"chain_name": "x"}"#),
            doc("osmosis/assetlist.json", OSMOSIS),
        ]);
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_blank_stable_id_is_ignored() {
        let raw = r#"{"assets":[{"denom_units":[{"denom":"ufoo","exponent":0}],"coingecko_id":"  "}]}"#;
        assert!(extract(&[doc("foo", raw)]).is_empty());
    }
}
