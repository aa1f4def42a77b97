use gort_domain::config::{Config, ConfigSeverity, DatabaseBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 4000);
}

#[test]
fn default_backend_is_memory() {
    let config = Config::default();
    assert_eq!(config.database.backend, DatabaseBackend::Memory);
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 4000
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn postgres_backend_without_uri_is_an_error() {
    let toml_str = r#"
[database]
backend = "postgres"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "database.uri"));
}

#[test]
fn memory_backend_only_warns() {
    let config = Config::default();
    assert!(config
        .validate()
        .iter()
        .all(|i| i.severity != ConfigSeverity::Error));
}
