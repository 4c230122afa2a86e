use std::path::{Path, PathBuf};

use serde_json::{Value, json};

/// Upload endpoint used by test configurations.
pub const TEST_UPLOAD_ENDPOINT: &str = "/api/users/sync";

/// Returns a complete configuration document for `dsn` and `base_url`.
///
/// Retries use millisecond delays so that retry tests stay fast.
pub fn test_config_json(dsn: &str, base_url: &str) -> Value {
    json!({
        "database": {
            "dsn": dsn,
            "username": "sync_user",
            "password": "sync_password"
        },
        "api": {
            "base_url": base_url,
            "upload_endpoint": TEST_UPLOAD_ENDPOINT,
            "timeout": 5,
            "retry": {
                "max_attempts": 3,
                "initial_delay_ms": 10,
                "max_delay_ms": 100,
                "backoff_multiplier": 2.0
            }
        },
        "settings": {
            "table_name": "acc_users",
            "batch_size": 100
        }
    })
}

/// Writes `config` as `config.json` inside `dir` and returns its path.
pub fn write_config(dir: &Path, config: &Value) -> PathBuf {
    let path = dir.join("config.json");
    let contents = serde_json::to_string_pretty(config).expect("failed to serialize config");
    std::fs::write(&path, contents).expect("failed to write config file");

    path
}
