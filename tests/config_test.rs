//! Tests for the shipped configuration file

use bookfleet::config::{Config, LogFormat};
use bookfleet::utils::{COORDINATOR_LIFETIME, WORKER_LIFETIME};
use bookfleet::worker::ProtocolVersion;
use std::path::Path;
use std::time::Duration;

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("bookfleet.toml");
    assert!(
        config_path.exists(),
        "bookfleet.toml should exist in project root"
    );
}

#[test]
fn test_config_file_parses_and_validates() {
    let config = Config::from_file(Path::new("bookfleet.toml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.coordinator.bind_address.port(), 4107);
    assert_eq!(config.coordinator.lifetime(), Duration::from_secs(4 * 24 * 3600));
    assert_eq!(config.coordinator.bounds.max_delta, 4);
    assert!(config.coordinator.metrics_path.is_some());

    assert_eq!(config.worker.protocol, ProtocolVersion::V3);
    assert_eq!(config.worker.lifetime(), Duration::from_secs(24 * 3600));
    assert_eq!(config.logging.format, LogFormat::Text);
}

#[test]
fn test_worker_id_falls_back_when_absent() {
    // The shipped file leaves worker_id out
    let config = Config::from_file(Path::new("bookfleet.toml")).unwrap();
    assert!(!config.worker.worker_id.trim().is_empty());
}

#[test]
fn test_shipped_lifetimes_match_built_in_caps() {
    let config = Config::from_file(Path::new("bookfleet.toml")).unwrap();
    assert_eq!(config.coordinator.lifetime(), COORDINATOR_LIFETIME);
    assert_eq!(config.worker.lifetime(), WORKER_LIFETIME);
}
