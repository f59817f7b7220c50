//! Engine configuration.
//!
//! A plain struct with documented defaults. The embedding process owns how it
//! is populated (file, flags, environment) and deserializes into this; every
//! field falls back to its default when absent.
//!
//! | Field | Default |
//! |-------|---------|
//! | `num_shards` | 64 |
//! | `port` | 8080 |
//! | `log_level` | "info" |
//! | `http_read_timeout` | 5s |
//! | `http_write_timeout` | 10s |
//! | `http_idle_timeout` | 120s |
//! | `db_max_conns` | 20 |
//! | `db_min_conns` | 2 |
//! | `db_max_conn_lifetime` | 30m |
//! | `db_max_conn_idle_time` | 5m |
//! | `db_acquire_timeout` | 5s |
//! | `db_query_timeout` | 5s |
//! | `trigger_retry_max` | 3 |
//! | `trigger_retry_backoff` | 100ms |
//! | `trigger_rpc_timeout` | 5s |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the backend-mapping JSON. Required by
    /// [`crate::bootstrap_from_paths`].
    #[serde(default)]
    pub shard_config_path: Option<PathBuf>,

    /// Path to the index-definition JSON; no secondary indexes when unset.
    #[serde(default)]
    pub index_config_path: Option<PathBuf>,

    /// Total shard count. Fixed at deploy time; must match the union of the
    /// backend ranges.
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,

    /// Listen port for the outer transport.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    // HTTP deadlines, consumed by the outer transport.
    #[serde(default = "default_http_read_timeout")]
    pub http_read_timeout: Duration,
    #[serde(default = "default_http_write_timeout")]
    pub http_write_timeout: Duration,
    #[serde(default = "default_http_idle_timeout")]
    pub http_idle_timeout: Duration,

    // Per-backend connection pool sizing.
    #[serde(default = "default_db_max_conns")]
    pub db_max_conns: u32,
    #[serde(default = "default_db_min_conns")]
    pub db_min_conns: u32,
    #[serde(default = "default_db_max_conn_lifetime")]
    pub db_max_conn_lifetime: Duration,
    #[serde(default = "default_db_max_conn_idle_time")]
    pub db_max_conn_idle_time: Duration,
    #[serde(default = "default_db_acquire_timeout")]
    pub db_acquire_timeout: Duration,

    /// Per-query context deadline applied inside every store.
    #[serde(default = "default_db_query_timeout")]
    pub db_query_timeout: Duration,

    // Trigger notification knobs.
    #[serde(default = "default_trigger_retry_max")]
    pub trigger_retry_max: u32,
    #[serde(default = "default_trigger_retry_backoff")]
    pub trigger_retry_backoff: Duration,
    #[serde(default = "default_trigger_rpc_timeout")]
    pub trigger_rpc_timeout: Duration,
}

fn default_num_shards() -> u32 {
    64
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_read_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_http_write_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_http_idle_timeout() -> Duration {
    Duration::from_secs(120)
}
fn default_db_max_conns() -> u32 {
    20
}
fn default_db_min_conns() -> u32 {
    2
}
fn default_db_max_conn_lifetime() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_db_max_conn_idle_time() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_db_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_db_query_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_trigger_retry_max() -> u32 {
    3
}
fn default_trigger_retry_backoff() -> Duration {
    Duration::from_millis(100)
}
fn default_trigger_rpc_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            shard_config_path: None,
            index_config_path: None,
            num_shards: default_num_shards(),
            port: default_port(),
            log_level: default_log_level(),
            http_read_timeout: default_http_read_timeout(),
            http_write_timeout: default_http_write_timeout(),
            http_idle_timeout: default_http_idle_timeout(),
            db_max_conns: default_db_max_conns(),
            db_min_conns: default_db_min_conns(),
            db_max_conn_lifetime: default_db_max_conn_lifetime(),
            db_max_conn_idle_time: default_db_max_conn_idle_time(),
            db_acquire_timeout: default_db_acquire_timeout(),
            db_query_timeout: default_db_query_timeout(),
            trigger_retry_max: default_trigger_retry_max(),
            trigger_retry_backoff: default_trigger_retry_backoff(),
            trigger_rpc_timeout: default_trigger_rpc_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = EngineConfig::default();
        assert_eq!(config.num_shards, 64);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.db_max_conns, 20);
        assert_eq!(config.db_min_conns, 2);
        assert_eq!(config.db_query_timeout, Duration::from_secs(5));
        assert_eq!(config.trigger_retry_max, 3);
        assert_eq!(config.trigger_retry_backoff, Duration::from_millis(100));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"num_shards": 8}"#).unwrap();
        assert_eq!(config.num_shards, 8);
        assert_eq!(config.port, 8080);
        assert_eq!(config.trigger_retry_max, 3);
        assert!(config.shard_config_path.is_none());
    }
}
