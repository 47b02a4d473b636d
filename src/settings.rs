use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Where asset documents are read from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Local git mirror of the chain registry
    #[default]
    Mirror,
    /// Per-chain asset lists served over HTTP
    Hosted,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Registry {
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Endpoint returning the branch head as JSON (`{"sha": "..."}`)
    #[serde(default = "default_revision_url")]
    pub revision_url: String,
    #[serde(default = "default_mirror_path")]
    pub mirror_path: PathBuf,
    /// Base URL for the hosted source; `{chain}/assetlist.json` is appended
    #[serde(default = "default_hosted_index_url")]
    pub hosted_index_url: String,
    #[serde(default = "default_hosted_chains")]
    pub hosted_chains: Vec<String>,
}

fn default_remote_url() -> String {
    "https://github.com/cosmos/chain-registry.git".to_string()
}
fn default_branch() -> String {
    "master".to_string()
}
fn default_revision_url() -> String {
    "https://api.github.com/repos/cosmos/chain-registry/commits/master".to_string()
}
fn default_mirror_path() -> PathBuf {
    PathBuf::from("chain-registry")
}
fn default_hosted_index_url() -> String {
    "https://raw.githubusercontent.com/cosmos/chain-registry/master".to_string()
}
fn default_hosted_chains() -> Vec<String> {
    vec!["osmosis".to_string(), "cosmoshub".to_string()]
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            remote_url: default_remote_url(),
            branch: default_branch(),
            revision_url: default_revision_url(),
            mirror_path: default_mirror_path(),
            hosted_index_url: default_hosted_index_url(),
            hosted_chains: default_hosted_chains(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Market {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    /// Ceiling on the comma-joined id list sent per request
    #[serde(default = "default_max_query_len")]
    pub max_query_len: usize,
    /// Ids per request; also sent as the result page size
    #[serde(default = "default_max_ids_per_batch")]
    pub max_ids_per_batch: usize,
    #[serde(default = "default_market_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Header the API key is sent in
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

fn default_market_base_url() -> String {
    "https://api.coingecko.com/api/v3/coins/markets".to_string()
}
fn default_vs_currency() -> String {
    "usd".to_string()
}
fn default_max_query_len() -> usize {
    2048
}
fn default_max_ids_per_batch() -> usize {
    250
}
fn default_market_timeout_ms() -> u64 {
    10_000
}
fn default_api_key_header() -> String {
    "x-cg-pro-api-key".to_string()
}

impl Default for Market {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
            vs_currency: default_vs_currency(),
            max_query_len: default_max_query_len(),
            max_ids_per_batch: default_max_ids_per_batch(),
            timeout_ms: default_market_timeout_ms(),
            api_key: None,
            api_key_header: default_api_key_header(),
        }
    }
}

/// A token the registry does not list but the catalog should still carry.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedToken {
    pub denom: String,
    pub stable_id: String,
    pub name: String,
    pub display: String,
    pub exponent: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_seed_tokens")]
    pub seed_tokens: Vec<SeedToken>,
}

fn default_interval_seconds() -> u64 {
    1800 // 30 min
}

// Axelar-bridged majors as they appear on Osmosis.
fn default_seed_tokens() -> Vec<SeedToken> {
    vec![
        SeedToken {
            denom: "ibc/D1542AA8762DB13087D8364F3EA6509FD6F009A34F00426AF9E4F9FA85CBBF1F"
                .to_string(),
            stable_id: "wrapped-bitcoin".to_string(),
            name: "Wrapped Bitcoin".to_string(),
            display: "wbtc".to_string(),
            exponent: 8,
        },
        SeedToken {
            denom: "ibc/EA1D43981D5C9A1C4AAEA9C23BB1D4FA126BA9BC7020A25E0AE4AA841EA25DC5"
                .to_string(),
            stable_id: "weth".to_string(),
            name: "Wrapped Ether".to_string(),
            display: "weth".to_string(),
            exponent: 18,
        },
    ]
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            seed_tokens: default_seed_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub registry: Registry,
    #[serde(default)]
    pub market: Market,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    /// Load from a TOML file (missing file means all defaults), then apply
    /// environment overrides.
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML string. No env overrides.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = Some(url.trim().to_string());
            }
        }

        if let Ok(key) = env::var("TOKEN_SYNC_MARKET_API_KEY") {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                self.market.api_key = Some(trimmed.to_string());
            }
        }

        if let Ok(addr) = env::var("TOKEN_SYNC_BIND_ADDR") {
            let trimmed = addr.trim();
            if !trimmed.is_empty() {
                self.server.bind_addr = trimmed.to_string();
            }
        }

        if let Ok(raw_chains) = env::var("TOKEN_SYNC_HOSTED_CHAINS") {
            let chains = parse_string_list(&raw_chains);
            if !chains.is_empty() {
                self.registry.hosted_chains = chains;
            }
        }
    }
}

/// Accepts either a JSON array (`["a","b"]`) or a plain comma-separated list.
fn parse_string_list(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return vec![];
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return v;
        }
    }

    trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
