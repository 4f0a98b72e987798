use fr_domain::config::{Config, EngineKind};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8760);
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
environments_path = "envs/catalog.json"

[server]
host = "0.0.0.0"
port = 9100

[engine]
begin_string = "FIX.4.2"
kind = "loopback"

[credentials]
dir = "/etc/fixrelay/certs"

[recovery]
stop_delay_ms = 250
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.engine.begin_string, "FIX.4.2");
    assert_eq!(config.engine.kind, EngineKind::Loopback);
    assert_eq!(config.recovery.stop_delay_ms, 250);
    assert_eq!(config.batch.client_buffer, 256);
    assert_eq!(
        config.environments_path,
        std::path::PathBuf::from("envs/catalog.json")
    );
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config
        .server
        .cors
        .allowed_origins
        .contains(&"http://localhost:*".to_string()));
    assert_eq!(config.server.cors.allowed_origins.len(), 2);
}

#[test]
fn config_roundtrips_through_toml() {
    let config = Config::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let back: Config = toml::from_str(&text).unwrap();
    assert_eq!(back.engine.data_dictionary, config.engine.data_dictionary);
    assert_eq!(back.credentials.dir, config.credentials.dir);
}
