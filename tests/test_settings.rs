//! Integration tests for configuration loading

use token_catalog_sync::settings::{Settings, SourceKind};

/// The shipped Config.toml matches the built-in defaults
#[test]
fn test_shipped_config_loads() {
    let settings = Settings::from_path("Config.toml").expect("Failed to load settings");

    assert_eq!(settings.registry.source, SourceKind::Mirror);
    assert_eq!(settings.registry.branch, "master");
    assert_eq!(settings.market.max_query_len, 2048);
    assert_eq!(settings.sync.interval_seconds, 1800);
    assert_eq!(settings.sync.seed_tokens.len(), 2);
    assert!(settings
        .sync
        .seed_tokens
        .iter()
        .all(|seed| seed.denom.starts_with("ibc/")));
}

/// A missing file is not an error: everything falls back to defaults
#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let settings = Settings::from_path(path.to_str().unwrap()).expect("defaults should load");

    assert_eq!(settings.server.bind_addr.rsplit(':').next(), Some("8000"));
    assert_eq!(settings.market.vs_currency, "usd");
}
