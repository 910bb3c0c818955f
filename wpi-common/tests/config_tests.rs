//! Tests for bootstrap configuration and root folder resolution
//!
//! Tests touching WPI_ROOT_FOLDER are marked #[serial] so they do not race on
//! the process environment.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use wpi_common::config::{
    load_toml_config, parse_toml_config, resolve_root_folder, RootFolderInitializer, TomlConfig,
    ROOT_FOLDER_ENV,
};

#[test]
fn test_empty_toml_uses_defaults() {
    let config = parse_toml_config("").unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.port, 5780);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.inference.timeout_secs, 30);
    assert!(config.inference.endpoint.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_full_toml() {
    let config = parse_toml_config(
        r#"
        root_folder = "/srv/wpi"
        port = 8080

        [inference]
        endpoint = "http://127.0.0.1:9000"
        timeout_secs = 5

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/wpi")));
    assert_eq!(config.port, 8080);
    assert_eq!(config.inference.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    assert_eq!(config.inference.timeout_secs, 5);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = parse_toml_config("port = \"not a number\"").unwrap_err();
    assert!(matches!(err, wpi_common::Error::Config(_)));
}

#[test]
fn test_explicit_missing_config_file_fails() {
    let result = load_toml_config(Some(Path::new("/definitely/not/here/config.toml")));
    assert!(result.is_err());
}

#[test]
fn test_explicit_config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 6000\n").unwrap();

    let config = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.port, 6000);
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(Some(Path::new("/from/cli")), ROOT_FOLDER_ENV, &toml);
    assert_eq!(root, PathBuf::from("/from/cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_environment_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, &toml);
    assert_eq!(root, PathBuf::from("/from/env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };
    assert_eq!(
        resolve_root_folder(None, ROOT_FOLDER_ENV, &toml),
        PathBuf::from("/from/toml")
    );

    let fallback = resolve_root_folder(None, ROOT_FOLDER_ENV, &TomlConfig::default());
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_initializer_creates_root_folder() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("wpi");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("wpi.db"));
}
