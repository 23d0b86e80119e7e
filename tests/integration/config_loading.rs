//! Integration tests for layered configuration loading

use crate::integration::test_utils::with_isolated_env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tracksched::{ConfigLoader, SchedulerConfig, SchedulerError};

#[test]
fn test_load_without_files_uses_defaults() {
    let test_dir = TempDir::new().unwrap();
    let (loaded, expected) = with_isolated_env(&test_dir, || {
        (ConfigLoader::load(None), SchedulerConfig::default())
    });
    assert_eq!(loaded.unwrap(), expected);
}

#[test]
fn test_explicit_file_overrides_defaults() {
    let test_dir = TempDir::new().unwrap();
    let path = test_dir.path().join("scheduler.toml");
    fs::write(
        &path,
        "inter_item_delay_ms = 40\ndefault_playback_lookahead = 4\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config = with_isolated_env(&test_dir, || ConfigLoader::load(Some(&path))).unwrap();
    assert_eq!(config.inter_item_delay(), Duration::from_millis(40));
    assert_eq!(config.default_playback_lookahead, 4);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_global_file_is_picked_up() {
    let test_dir = TempDir::new().unwrap();
    let config = with_isolated_env(&test_dir, || {
        let global = ConfigLoader::global_config_path().unwrap();
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(&global, "inter_item_delay_ms = 75\n").unwrap();
        ConfigLoader::load(None)
    })
    .unwrap();
    assert_eq!(config.inter_item_delay_ms, 75);
}

#[test]
fn test_environment_overrides_files() {
    let test_dir = TempDir::new().unwrap();
    let path = test_dir.path().join("scheduler.toml");
    fs::write(&path, "inter_item_delay_ms = 40\n").unwrap();

    let config = with_isolated_env(&test_dir, || {
        std::env::set_var("TRACKSCHED_INTER_ITEM_DELAY_MS", "250");
        std::env::set_var("TRACKSCHED_LOGGING__LEVEL", "warn");
        ConfigLoader::load(Some(&path))
    })
    .unwrap();
    assert_eq!(config.inter_item_delay_ms, 250);
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let test_dir = TempDir::new().unwrap();
    let path = test_dir.path().join("absent.toml");
    let result = with_isolated_env(&test_dir, || ConfigLoader::load(Some(&path)));
    assert!(matches!(result, Err(SchedulerError::Config(_))));
}

#[test]
fn test_invalid_values_fail_validation() {
    let test_dir = TempDir::new().unwrap();
    let path = test_dir.path().join("scheduler.toml");
    fs::write(
        &path,
        "inter_item_delay_ms = 120000\n\n[logging]\nlevel = \"loud\"\n",
    )
    .unwrap();

    let err = with_isolated_env(&test_dir, || ConfigLoader::load(Some(&path))).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("inter_item_delay_ms"));
    assert!(message.contains("loud"));
}
