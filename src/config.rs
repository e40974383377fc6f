use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the session adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "system".to_string(),
            username: None,
            password: None,
            connection_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            pool_size: 4,
        }
    }
}

/// DML logging knobs, threaded into every statement wrapper at construction.
/// The embedding application decides these once; the wrappers never consult
/// global logger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmlLogConfig {
    pub debug_enabled: bool,
    pub trace_enabled: bool,
    pub logger_name: String,
}

impl Default for DmlLogConfig {
    fn default() -> Self {
        Self {
            debug_enabled: false,
            trace_enabled: false,
            logger_name: "cqlkit.dml".to_string(),
        }
    }
}

impl DmlLogConfig {
    /// A config with statement debug logging switched on.
    pub fn verbose() -> Self {
        Self {
            debug_enabled: true,
            trace_enabled: false,
            logger_name: "cqlkit.dml".to_string(),
        }
    }
}
