use crate::db::{MemoryStorage, SqliteStorage, Storage, StorageError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_BASE_URL: &str = "HELPDESK_BACKEND_URL";
const ENV_REQUEST_TIMEOUT: &str = "HELPDESK_REQUEST_TIMEOUT_SECS";
const ENV_HISTORY_DB: &str = "HELPDESK_HISTORY_DB";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// History lives as long as the process.
    Memory,
    /// History persisted to a SQLite file.
    Sqlite(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for plain JSON calls. Chat streams are not bounded by it.
    pub request_timeout: Duration,
    pub storage: StorageConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            storage: StorageConfig::Memory,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = normalize_base_url(url);
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "ignoring invalid {ENV_REQUEST_TIMEOUT}"),
            }
        }
        if let Some(path) = lookup(ENV_HISTORY_DB).filter(|v| !v.trim().is_empty()) {
            config.storage = StorageConfig::Sqlite(PathBuf::from(path));
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(base_url.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn tickets_url(&self) -> String {
        format!("{}/api/tickets", self.base_url)
    }

    pub fn open_storage(&self) -> Result<Arc<dyn Storage>, StorageError> {
        Ok(match &self.storage {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            StorageConfig::Sqlite(path) => Arc::new(SqliteStorage::open(path)?),
        })
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
