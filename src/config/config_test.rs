use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_statewatch_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("STATEWATCH__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = StateWatchConfig::default();

    assert_eq!(config.feed.registry_capacity, 64);
    assert_eq!(config.watcher.stop_timeout_ms, 5000);
    assert!(!config.watcher.trace_merges);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_statewatch_env_vars();
    with_vars(
        vec![
            ("STATEWATCH__WATCHER__STOP_TIMEOUT_MS", Some("250")),
            ("STATEWATCH__WATCHER__TRACE_MERGES", Some("true")),
        ],
        || {
            let config = StateWatchConfig::new().unwrap();

            assert_eq!(config.watcher.stop_timeout_ms, 250);
            assert!(config.watcher.trace_merges);
            assert_eq!(config.feed.registry_capacity, 64);
        },
    );
}

#[test]
#[serial]
fn new_should_load_file_named_by_config_path() {
    cleanup_all_statewatch_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("statewatch.toml");
    std::fs::write(
        &config_path,
        r#"
        [feed]
        registry_capacity = 512
        "#,
    )
    .unwrap();

    with_vars(vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))], || {
        let config = StateWatchConfig::new().unwrap();

        assert_eq!(config.feed.registry_capacity, 512);
        assert_eq!(config.watcher.stop_timeout_ms, 5000);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_statewatch_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        [watcher]
        stop_timeout_ms = 1200 # Override default value
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base = StateWatchConfig::new().unwrap();
        let config = base.with_override_config(config_path.to_str().unwrap()).unwrap();

        assert_eq!(config.watcher.stop_timeout_ms, 1200);
        assert_eq!(config.feed.registry_capacity, 64);
    });
}

#[test]
#[serial]
fn environment_should_win_over_override_file() {
    cleanup_all_statewatch_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(&config_path, "[watcher]\nstop_timeout_ms = 1200\n").unwrap();

    with_vars(vec![("STATEWATCH__WATCHER__STOP_TIMEOUT_MS", Some("90"))], || {
        let config = StateWatchConfig::default()
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.watcher.stop_timeout_ms, 90);
    });
}

#[test]
#[serial]
fn validate_should_reject_zero_stop_timeout() {
    let mut config = StateWatchConfig::default();
    config.watcher.stop_timeout_ms = 0;

    let result = config.validate();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn validate_should_reject_zero_registry_capacity() {
    let mut config = StateWatchConfig::default();
    config.feed.registry_capacity = 0;

    let result = config.validate();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn validate_should_accept_defaults() {
    assert!(StateWatchConfig::default().validate().is_ok());
}
