use serde::{Deserialize, Serialize};

/// Prefix used by the chain registry for assets bridged in over IBC
/// (`ibc/<sha256 of the transfer path>`).
pub const CROSS_CHAIN_DENOM_PREFIX: &str = "ibc/";

/// Where a denom originates. Computed once at extraction so downstream stages
/// never re-test the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenomOrigin {
    Native,
    CrossChain,
}

impl DenomOrigin {
    /// Classify a denom by the cross-chain naming convention (case-insensitive).
    pub fn classify(denom: &str) -> Self {
        let is_cross_chain = denom
            .get(..CROSS_CHAIN_DENOM_PREFIX.len())
            .map(|prefix| prefix.eq_ignore_ascii_case(CROSS_CHAIN_DENOM_PREFIX))
            .unwrap_or(false);

        if is_cross_chain {
            DenomOrigin::CrossChain
        } else {
            DenomOrigin::Native
        }
    }

    pub fn is_cross_chain(&self) -> bool {
        matches!(self, DenomOrigin::CrossChain)
    }
}

/// Market metrics carried alongside a token. All of them are optional on the
/// wire and zero until the pricing service fills them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFields {
    pub liquidity: f64,
    pub volume_24h: f64,
    pub volume_24h_change: f64,
    pub price_24h_change: f64,
    pub price_7d_change: f64,
}

/// A token found in the registry during the current run. Never outlives the run.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateToken {
    pub denom: String,
    pub exponent: i32,
    pub name: String,
    pub display: String,
    /// Cross-reference key used to join with the pricing service.
    pub stable_id: String,
    pub origin: DenomOrigin,
    pub market: MarketFields,
}

impl CandidateToken {
    pub fn new(
        denom: impl Into<String>,
        exponent: i32,
        name: impl Into<String>,
        display: impl Into<String>,
        stable_id: impl Into<String>,
    ) -> Self {
        let denom = denom.into();
        let origin = DenomOrigin::classify(&denom);
        Self {
            denom,
            exponent,
            name: name.into(),
            display: display.into(),
            stable_id: stable_id.into(),
            origin,
            market: MarketFields::default(),
        }
    }

    pub fn is_cross_chain(&self) -> bool {
        self.origin.is_cross_chain()
    }
}

/// A candidate joined with its market record. The stable id is gone and the
/// price is guaranteed positive.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedToken {
    pub denom: String,
    pub exponent: i32,
    pub name: String,
    pub display: String,
    pub origin: DenomOrigin,
    pub symbol: String,
    pub price: f64,
    pub market: MarketFields,
}

/// Persisted catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub denom: String,
    pub symbol: String,
    pub price: f64,
    pub liquidity: f64,
    pub volume_24h: f64,
    pub volume_24h_change: f64,
    pub price_24h_change: f64,
    pub price_7d_change: f64,
    pub exponent: i32,
    pub display: String,
    pub name: String,
}

/// Everything in a catalog row except its id: what an insert or an in-place
/// update writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub denom: String,
    pub symbol: String,
    pub price: f64,
    pub liquidity: f64,
    pub volume_24h: f64,
    pub volume_24h_change: f64,
    pub price_24h_change: f64,
    pub price_7d_change: f64,
    pub exponent: i32,
    pub display: String,
    pub name: String,
}

impl CatalogRecord {
    pub fn into_entry(self, id: i64) -> CatalogEntry {
        CatalogEntry {
            id,
            denom: self.denom,
            symbol: self.symbol,
            price: self.price,
            liquidity: self.liquidity,
            volume_24h: self.volume_24h,
            volume_24h_change: self.volume_24h_change,
            price_24h_change: self.price_24h_change,
            price_7d_change: self.price_7d_change,
            exponent: self.exponent,
            display: self.display,
            name: self.name,
        }
    }
}

impl From<&EnrichedToken> for CatalogRecord {
    fn from(token: &EnrichedToken) -> Self {
        Self {
            denom: token.denom.clone(),
            symbol: token.symbol.clone(),
            price: token.price,
            liquidity: token.market.liquidity,
            volume_24h: token.market.volume_24h,
            volume_24h_change: token.market.volume_24h_change,
            price_24h_change: token.market.price_24h_change,
            price_7d_change: token.market.price_7d_change,
            exponent: token.exponent,
            display: token.display.clone(),
            name: token.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_cross_chain_prefix() {
        assert_eq!(
            DenomOrigin::classify("ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2"),
            DenomOrigin::CrossChain
        );
        // Case-insensitive
        assert_eq!(DenomOrigin::classify("IBC/ABCDEF"), DenomOrigin::CrossChain);
        assert_eq!(DenomOrigin::classify("uatom"), DenomOrigin::Native);
        // Too short to carry the prefix
        assert_eq!(DenomOrigin::classify("ib"), DenomOrigin::Native);
        // Prefix has to be at the start
        assert_eq!(DenomOrigin::classify("gamm/ibc/1"), DenomOrigin::Native);
    }

    #[test]
    fn test_candidate_market_fields_start_at_zero() {
        let token = CandidateToken::new("uosmo", 6, "Osmosis", "osmo", "osmosis");
        assert_eq!(token.market, MarketFields::default());
        assert!(!token.is_cross_chain());
    }
}
