//! Integration tests for broker startup against a fresh root directory.

use daebug::config::{derive_default_port, BrokerConfig, CliOverrides};
use tempfile::TempDir;

#[test]
fn fresh_root_yields_deterministic_port_and_paths() {
    let temp_dir = TempDir::new().unwrap();
    let overrides = CliOverrides {
        root: Some(temp_dir.path().to_path_buf()),
        port: None,
    };
    let config = BrokerConfig::load(overrides).unwrap();

    assert_eq!(config.root, temp_dir.path());
    assert_eq!(config.port, derive_default_port(temp_dir.path()));
    assert_eq!(config.page_dir, "daebug-pages");
    assert_eq!(config.master_file, "daebug.md");
}

#[test]
fn explicit_port_override_wins() {
    let temp_dir = TempDir::new().unwrap();
    let overrides = CliOverrides {
        root: Some(temp_dir.path().to_path_buf()),
        port: Some(9999),
    };
    let config = BrokerConfig::load(overrides).unwrap();
    assert_eq!(config.port, 9999);
}
