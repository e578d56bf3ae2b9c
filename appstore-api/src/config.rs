use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Request body cap for uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Seconds between reconcile sweeps; 0 disables the background task
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Age after which an uncommitted upload is considered abandoned
    #[serde(default = "default_stale_upload_secs")]
    pub stale_upload_secs: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".appstore")
}

fn default_bind_addr() -> String {
    std::env::var("APPSTORE_BIND").unwrap_or_else(|_| "0.0.0.0:3130".to_string())
}

fn default_db_path() -> PathBuf {
    std::env::var("APPSTORE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("catalog.db"))
}

fn default_storage_root() -> PathBuf {
    std::env::var("APPSTORE_STORAGE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("storage"))
}

fn default_max_upload_bytes() -> usize {
    env_parse("APPSTORE_MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
}

fn default_reconcile_interval() -> u64 {
    env_parse("APPSTORE_RECONCILE_INTERVAL").unwrap_or(3600) // 1 hour
}

fn default_stale_upload_secs() -> u64 {
    env_parse("APPSTORE_STALE_UPLOAD_SECS").unwrap_or(86400) // 1 day
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            storage_root: default_storage_root(),
            max_upload_bytes: default_max_upload_bytes(),
            reconcile_interval_secs: default_reconcile_interval(),
            stale_upload_secs: default_stale_upload_secs(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn stale_upload_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stale_upload_secs)
    }
}
