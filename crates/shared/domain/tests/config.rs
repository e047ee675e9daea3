use keeper_domain::config::{ApiConfig, DatabaseConfig, SecurityConfig, ServerConfig, StorageConfig};
use serde_json::json;

#[test]
fn config_defaults_are_sane() {
    let server = ServerConfig::default();
    assert_eq!(server.port, 8080);
    assert!(server.address.is_loopback());
    assert!(server.ssl.is_none());
    assert!(server.worker_threads.is_none());

    let db = DatabaseConfig::default();
    assert_eq!(db.url, "sqlite://keeper.db");
    assert_eq!(db.max_connections, 8);

    let storage = StorageConfig::default();
    assert_eq!(storage.data_dir, std::path::PathBuf::from("save_file"));

    let security = SecurityConfig::default();
    assert!(security.uses_default_secret());
    assert_eq!(security.jwt.leeway_seconds, 0);
    assert_eq!(security.session_cache.ttl_seconds, 600);
}

#[test]
fn api_config_deserializes() {
    let raw = json!({
        "server": { "address": "::", "port": 9000, "worker_threads": 2 },
        "database": { "url": "sqlite://data/vault.db" },
        "storage": { "data_dir": "/tmp/files" },
        "security": { "secret": "correct horse battery staple", "jwt": { "ttl_seconds": 60 } },
        "logging": { "level": "debug", "json": true }
    });

    let cfg: ApiConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.worker_threads, Some(2));
    assert_eq!(cfg.database.url, "sqlite://data/vault.db");
    assert_eq!(cfg.database.busy_timeout_seconds, 5);
    assert_eq!(cfg.storage.data_dir, std::path::PathBuf::from("/tmp/files"));
    assert!(!cfg.security.uses_default_secret());
    assert_eq!(cfg.security.jwt.ttl_seconds, 60);
    assert_eq!(cfg.security.session_cache.capacity, 10_000);
    assert!(cfg.logging.json);
}

#[test]
fn security_debug_hides_secret() {
    let cfg: ApiConfig =
        serde_json::from_value(json!({ "security": { "secret": "hunter2-hunter2" } })).expect("config");
    assert!(!format!("{cfg:?}").contains("hunter2"));
}

#[test]
fn mutation_does_not_leak_into_clones() {
    let original = ApiConfig::default();
    let mut changed = original.clone();
    changed.server.port = 1;
    assert_eq!(original.server.port, 8080);
    assert_eq!(changed.server.port, 1);
}
