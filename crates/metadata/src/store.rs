//! Replicated SQLite store: one writable primary plus read replicas.

use crate::error::{MetadataError, MetadataResult};
use crate::models::ReplicaStatus;
use crate::session::{Consistency, Session};
use r2index_core::config::MetadataConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One database the store can route queries to.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) pool: Pool<Sqlite>,
}

impl Node {
    /// Last commit sequence applied to this node.
    pub(crate) async fn commit_seq(&self) -> MetadataResult<u64> {
        let seq: i64 = sqlx::query_scalar("SELECT seq FROM commit_log WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(seq).unwrap_or(0))
    }

    /// Open a read transaction and return it with the sequence it sees.
    ///
    /// The sequence is the first statement of the transaction, so it is
    /// pinned to the same snapshot every later query in `tx` reads from.
    pub(crate) async fn begin_snapshot(&self) -> MetadataResult<(Transaction<'static, Sqlite>, u64)> {
        let mut tx = self.pool.begin().await?;
        let seq: i64 = sqlx::query_scalar("SELECT seq FROM commit_log WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        Ok((tx, u64::try_from(seq).unwrap_or(0)))
    }
}

/// SQLite-based metadata store fronting a primary and its read replicas.
///
/// Writes always go to the primary. Each write transaction advances the
/// primary's `commit_log.seq`; replicas expose the last sequence they have
/// applied, which is what sessions compare bookmarks against.
#[derive(Debug)]
pub struct SqliteStore {
    primary: Node,
    replicas: Vec<Node>,
    cursor: AtomicUsize,
}

impl SqliteStore {
    /// Open a store on a single database file with default settings.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        Self::open(&MetadataConfig::for_path(path.as_ref())).await
    }

    /// Open the primary (creating and migrating it if needed) and attach replicas.
    pub async fn open(config: &MetadataConfig) -> MetadataResult<Self> {
        config.validate().map_err(MetadataError::Config)?;

        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.query_timeout())
            .connect_with(opts)
            .await?;

        let primary = Node {
            name: "primary".to_string(),
            pool,
        };
        migrate(&primary.pool).await?;

        let mut replicas = Vec::with_capacity(config.replicas.len());
        for (i, path) in config.replicas.iter().enumerate() {
            // Replicas are maintained externally; query_only keeps this
            // process from ever writing to them.
            let opts = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(false)
                .foreign_keys(true)
                .busy_timeout(config.busy_timeout())
                .pragma("query_only", "ON");

            let pool = SqlitePoolOptions::new()
                .max_connections(config.replica_connections)
                .acquire_timeout(config.query_timeout())
                .connect_with(opts)
                .await?;

            let node = Node {
                name: format!("replica-{i}"),
                pool,
            };
            let seq = node.commit_seq().await.map_err(|e| {
                MetadataError::Config(format!(
                    "replica {} is not a usable r2index database: {e}",
                    path.display()
                ))
            })?;
            tracing::info!(
                replica = %node.name,
                path = %path.display(),
                seq,
                "Read replica attached"
            );
            replicas.push(node);
        }

        let store = Self {
            primary,
            replicas,
            cursor: AtomicUsize::new(0),
        };

        let seq = store.primary.commit_seq().await?;
        tracing::info!(
            path = %config.path.display(),
            replicas = store.replicas.len(),
            seq,
            "Metadata store opened"
        );

        Ok(store)
    }

    /// Open a session, honouring a client-presented bookmark if it parses.
    pub fn open_session(&self, token: Option<&str>) -> Session<'_> {
        Session::new(self, Consistency::from_token(token))
    }

    /// Open a session with an explicit consistency requirement.
    pub fn open_session_with(&self, consistency: Consistency) -> Session<'_> {
        Session::new(self, consistency)
    }

    /// Get a reference to the primary connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.primary.pool
    }

    pub(crate) fn primary(&self) -> &Node {
        &self.primary
    }

    /// Replicas in round-robin order, starting one further on each call.
    pub(crate) fn replicas_in_rotation(&self) -> impl Iterator<Item = &Node> {
        let n = self.replicas.len();
        let start = if n == 0 {
            0
        } else {
            self.cursor.fetch_add(1, Ordering::Relaxed) % n
        };
        (0..n).map(move |i| &self.replicas[(start + i) % n])
    }

    /// Write a consistent copy of the primary to `path` for use as a replica.
    pub async fn snapshot_into(&self, path: impl AsRef<Path>) -> MetadataResult<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(MetadataError::Config(format!(
                "snapshot target {} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let target = path.to_str().ok_or_else(|| {
            MetadataError::Config(format!("snapshot path {} is not UTF-8", path.display()))
        })?;

        sqlx::query("VACUUM INTO ?")
            .bind(target)
            .execute(&self.primary.pool)
            .await?;

        tracing::info!(path = %path.display(), "Primary snapshot written");
        Ok(())
    }

    /// Commit position of every replica relative to the primary.
    pub async fn replica_lag(&self) -> MetadataResult<Vec<ReplicaStatus>> {
        let primary_seq = self.primary.commit_seq().await?;
        let mut statuses = Vec::with_capacity(self.replicas.len());
        for node in &self.replicas {
            let seq = node.commit_seq().await?;
            let lag = primary_seq.saturating_sub(seq);
            if lag > 0 {
                tracing::warn!(replica = %node.name, seq, primary_seq, lag, "Replica is behind primary");
            }
            statuses.push(ReplicaStatus {
                name: node.name.clone(),
                seq,
                lag,
            });
        }
        Ok(statuses)
    }

    /// Check connectivity of the primary and every replica.
    pub async fn health_check(&self) -> MetadataResult<()> {
        for node in std::iter::once(&self.primary).chain(&self.replicas) {
            sqlx::query("SELECT 1").execute(&node.pool).await?;
        }
        Ok(())
    }

    /// Close every connection pool.
    pub async fn close(&self) {
        self.primary.pool.close().await;
        for node in &self.replicas {
            node.pool.close().await;
        }
    }
}

/// Create the schema on the primary if it does not exist yet.
async fn migrate(pool: &Pool<Sqlite>) -> MetadataResult<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Commit point of the database. Bumped by every write transaction.
CREATE TABLE IF NOT EXISTS commit_log (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    seq INTEGER NOT NULL
);
INSERT OR IGNORE INTO commit_log (id, seq) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    name TEXT,
    category TEXT NOT NULL,
    entity TEXT NOT NULL,
    extension TEXT NOT NULL,
    media_type TEXT NOT NULL,
    remote_path TEXT NOT NULL,
    remote_filename TEXT NOT NULL,
    remote_version TEXT NOT NULL,
    metadata_path TEXT,
    size INTEGER,
    md5 TEXT,
    sha1 TEXT,
    sha256 TEXT,
    sha512 TEXT,
    extra TEXT NOT NULL DEFAULT '{}',
    deprecated INTEGER NOT NULL DEFAULT 0,
    deprecation_reason TEXT,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_remote_tuple
    ON files(remote_path, remote_filename, remote_version);
CREATE INDEX IF NOT EXISTS idx_files_category ON files(category);
CREATE INDEX IF NOT EXISTS idx_files_entity ON files(entity);
CREATE INDEX IF NOT EXISTS idx_files_extension ON files(extension);
CREATE INDEX IF NOT EXISTS idx_files_media_type ON files(media_type);
CREATE INDEX IF NOT EXISTS idx_files_deprecated ON files(deprecated);
CREATE INDEX IF NOT EXISTS idx_files_updated ON files(updated DESC, id);

CREATE TABLE IF NOT EXISTS file_tags (
    file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (file_id, tag)
);
CREATE INDEX IF NOT EXISTS idx_file_tags_tag ON file_tags(tag);
"#;
