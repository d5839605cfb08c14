//! ---
//! ret_section: "15-testing-qa-runbook"
//! ret_subsection: "integration-tests"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Integration and validation tests for the licensing stack."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use ret_common::config::AppConfig;
use ret_common::logging::LogFormat;

#[test]
fn resolution_order_env_then_candidates_then_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let candidate = dir.path().join("ret-licensing.toml");
    let override_path = dir.path().join("override.toml");
    let missing = dir.path().join("missing.toml");

    std::env::remove_var(AppConfig::ENV_CONFIG_PATH);
    let loaded = AppConfig::load_with_source(&[&missing]).unwrap();
    assert!(loaded.source.is_none());
    assert_eq!(loaded.config.license.trial_days, 7);

    fs::write(&candidate, "[usage]\ncache_ttl = 5\n").unwrap();
    let loaded = AppConfig::load_with_source(&[&missing, &candidate]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(candidate.as_path()));
    assert_eq!(loaded.config.usage.cache_ttl, Duration::from_secs(5));

    fs::write(&override_path, "[logging]\nformat = \"pretty\"\n").unwrap();
    std::env::set_var(AppConfig::ENV_CONFIG_PATH, &override_path);
    let loaded = AppConfig::load_with_source(&[&candidate]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(override_path.as_path()));
    assert_eq!(loaded.config.logging.format, LogFormat::Pretty);

    fs::write(&override_path, "[license]\ntrial_days = 45\n").unwrap();
    assert!(AppConfig::load_with_source(&[&candidate]).is_err());

    std::env::set_var(AppConfig::ENV_CONFIG_PATH, &missing);
    assert!(AppConfig::load_with_source(&[&candidate]).is_err());
    std::env::remove_var(AppConfig::ENV_CONFIG_PATH);
}
