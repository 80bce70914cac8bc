//! Metadata store test utilities.

use r2index_core::FileCreate;
use r2index_core::config::MetadataConfig;
use r2index_metadata::{MetadataResult, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A single-node test store that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        Self::with_connections(1).await
    }

    /// A store whose primary pool holds up to `max_connections` connections.
    pub async fn with_connections(max_connections: u32) -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = MetadataConfig {
            max_connections,
            ..MetadataConfig::for_path(temp_dir.path().join("test.db"))
        };
        let store = SqliteStore::open(&config).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the primary pool for raw queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }
}

/// A primary with one read replica that never catches up on its own.
///
/// The replica is a snapshot of the primary taken before the store opened,
/// so every write made through `store` leaves it further behind.
#[allow(dead_code)]
pub struct ReplicatedMetadata {
    pub store: SqliteStore,
    pub primary_path: PathBuf,
    pub replica_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl ReplicatedMetadata {
    /// Replica snapshot of an empty primary.
    pub async fn new() -> MetadataResult<Self> {
        Self::seeded(&[]).await
    }

    /// Replica snapshot taken after creating `seed` on the primary.
    pub async fn seeded(seed: &[FileCreate]) -> MetadataResult<Self> {
        use r2index_metadata::FileRepo;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let primary_path = temp_dir.path().join("primary.db");
        let replica_path = temp_dir.path().join("replica.db");

        let primary = SqliteStore::new(&primary_path).await?;
        {
            let session = primary.open_session(None);
            for input in seed {
                session.create_file(input).await?;
            }
        }
        primary.snapshot_into(&replica_path).await?;
        primary.close().await;

        let config = MetadataConfig {
            replicas: vec![replica_path.clone()],
            max_connections: 4,
            ..MetadataConfig::for_path(&primary_path)
        };
        let store = SqliteStore::open(&config).await?;

        Ok(Self {
            store,
            primary_path,
            replica_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A valid create payload for the given remote tuple.
#[allow(dead_code)]
pub fn sample_file(remote_path: &str, remote_filename: &str, remote_version: &str) -> FileCreate {
    let extension = remote_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("bin")
        .to_string();
    FileCreate {
        name: Some(remote_filename.to_string()),
        category: "software".to_string(),
        entity: "acme".to_string(),
        media_type: format!("application/{extension}"),
        extension,
        remote_path: remote_path.to_string(),
        remote_filename: remote_filename.to_string(),
        remote_version: remote_version.to_string(),
        ..Default::default()
    }
}

/// Count tag rows for a record straight from the primary.
#[allow(dead_code)]
pub async fn raw_tag_count(pool: &Pool<Sqlite>, file_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM file_tags WHERE file_id = ?")
        .bind(file_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count tags")
}
