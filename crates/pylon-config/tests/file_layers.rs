//! Loading configuration files from disk.

use pylon_config::{ConfigError, ConfigLoader, LogFormat, StoreBackend};
use std::io::Write;

fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn toml_file_is_applied() {
    let file = write_file(
        ".toml",
        r#"
            [server]
            http_addr = "127.0.0.1:7000"
            server_name = "pylon-test"

            [store]
            backend = "hashed"
            prefill = 2
            max_idle = 8

            [pipeline]
            strict_components = true

            [logging]
            format = "pretty"
        "#,
    );

    let loader = ConfigLoader::new().with_file(file.path()).unwrap();
    assert!(loader.file_loaded());
    let config = loader.load().unwrap();

    assert_eq!(config.server.http_addr, "127.0.0.1:7000");
    assert_eq!(config.server.server_name, "pylon-test");
    assert_eq!(config.store.backend, StoreBackend::Hashed);
    assert_eq!(config.store.max_idle, 8);
    assert!(config.pipeline.strict_components);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn json_file_is_applied() {
    let file = write_file(".json", r#"{"store": {"prefill": 0}}"#);
    let config = ConfigLoader::new()
        .with_optional_file(file.path())
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(config.store.prefill, 0);
}

#[test]
fn unknown_field_in_file_fails() {
    let file = write_file(".toml", "[store]\nshards = 4\n");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn unsupported_extension_fails() {
    let file = write_file(".yaml", "server: {}\n");
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
}

#[test]
fn invalid_values_fail_validation_on_load() {
    let file = write_file(".toml", "[store]\nprefill = 100\nmax_idle = 10\n");
    let result = ConfigLoader::new().with_file(file.path()).unwrap().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
