//! Store configuration
//!
//! Resolution order: built-in defaults, then `~/.pharmadb/config.toml`
//! (or an explicit file), then environment variables. `.env` loading is
//! left to the binary.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Transaction isolation level used for every `BEGIN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "read-committed" => Ok(Self::ReadCommitted),
            "repeatable-read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            other => Err(CoreError::config(format!("unknown isolation level '{other}'"))),
        }
    }
}

/// Connection pool limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// How long `acquire` waits before failing with ResourceExhausted
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// Transaction behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Lifetime of a session's transaction, measured from acquisition
    #[serde(default = "default_transaction_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Extra attempts for message appends aborted by serialization failures
    #[serde(default = "default_append_retry_limit")]
    pub append_retry_limit: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transaction_timeout_secs(),
            isolation: IsolationLevel::default(),
            append_retry_limit: default_append_retry_limit(),
        }
    }
}

/// Top-level store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool: PoolConfig::default(),
            transactions: TransactionConfig::default(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/pharmacopoeia".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_transaction_timeout_secs() -> u64 {
    30
}

fn default_append_retry_limit() -> u32 {
    3
}

impl StoreConfig {
    /// Load from the default file (if present) and the process environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::debug!(?path, "no config file, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| CoreError::toml(path, source))
    }

    /// Config file path: ~/.pharmadb/config.toml
    pub fn config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// ~/.pharmadb
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pharmadb")
    }

    /// Apply `DATABASE_URL` and `PHARMADB_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            self.database_url = url;
        }
        if let Some(value) = lookup("PHARMADB_MAX_CONNECTIONS") {
            self.pool.max_connections = parse_number("PHARMADB_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("PHARMADB_MIN_CONNECTIONS") {
            self.pool.min_connections = parse_number("PHARMADB_MIN_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("PHARMADB_ACQUIRE_TIMEOUT_SECS") {
            self.pool.acquire_timeout_secs = parse_number("PHARMADB_ACQUIRE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PHARMADB_TRANSACTION_TIMEOUT_SECS") {
            self.transactions.timeout_secs =
                parse_number("PHARMADB_TRANSACTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PHARMADB_ISOLATION") {
            self.transactions.isolation = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.max_connections == 0 {
            return Err(CoreError::config("pool.max_connections must be at least 1"));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(CoreError::config(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        if self.pool.acquire_timeout_secs == 0 {
            return Err(CoreError::config("pool.acquire_timeout_secs must be positive"));
        }
        if self.transactions.timeout_secs == 0 {
            return Err(CoreError::config("transactions.timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.acquire_timeout_secs)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transactions.timeout_secs)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::config(format!("{key} must be a non-negative integer, got '{value}'")))
}
