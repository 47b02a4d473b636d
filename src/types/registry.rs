use serde::Deserialize;

// Raw chain-registry asset list, as found in `<chain>/assetlist.json`.
// Only the fields the catalog needs are modelled; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetList {
    #[serde(default)]
    pub chain_name: Option<String>,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub denom_units: Vec<DenomUnit>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub coingecko_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenomUnit {
    pub denom: String,
    pub exponent: i32,
}

/// A raw asset document plus where it came from (mirror path or URL).
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDocument {
    pub origin: String,
    pub contents: String,
}
