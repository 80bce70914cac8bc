//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Primary database file path (read/write).
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Read replica database files. Each replica is a copy of the primary kept
    /// current by an external replication process or by snapshots.
    #[serde(default)]
    pub replicas: Vec<PathBuf>,
    /// Maximum time to wait for a pooled connection, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Connections to the primary. SQLite allows one writer at a time; keeping
    /// this at 1 avoids "database is locked" failures on lock upgrades.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connections per read replica.
    #[serde(default = "default_replica_connections")]
    pub replica_connections: u32,
}

fn default_path() -> PathBuf {
    PathBuf::from("./data/r2index.db")
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    1
}

fn default_replica_connections() -> u32 {
    4
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            replicas: Vec::new(),
            query_timeout_secs: default_query_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
            replica_connections: default_replica_connections(),
        }
    }
}

impl MetadataConfig {
    /// Configuration for a single database file with default settings.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("metadata.max_connections must be at least 1".to_string());
        }
        if !self.replicas.is_empty() && self.replica_connections == 0 {
            return Err("metadata.replica_connections must be at least 1".to_string());
        }
        if self.replicas.iter().any(|replica| *replica == self.path) {
            return Err(format!(
                "metadata.replicas must not include the primary path {}",
                self.path.display()
            ));
        }
        Ok(())
    }
}

/// Search configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size when a query does not specify one.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Largest page size a query may request.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    crate::DEFAULT_PAGE_LIMIT
}

fn default_max_limit() -> u32 {
    crate::MAX_PAGE_LIMIT
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err("search limits must be at least 1".to_string());
        }
        if self.default_limit > self.max_limit {
            return Err(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.default_limit, self.max_limit
            ));
        }
        Ok(())
    }
}

/// Full application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.search.validate()
    }
}
