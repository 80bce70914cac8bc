//! Repository implementations for sessions over the SQLite store.
//!
//! Helpers here take `&mut SqliteConnection` so the same code runs inside a
//! primary write transaction or a read transaction on whichever node the
//! session routed to.

mod files;
mod search;
mod tags;

use crate::error::{MetadataError, MetadataResult};
use crate::models::{FileRow, TagRow};
use r2index_core::{FileRecord, RemoteTuple};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

/// Ids per `IN (...)` list when loading tags, well under SQLite's variable limit.
const TAG_BATCH: usize = 500;

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Turn a unique violation on the remote tuple index into `Conflict`.
pub(crate) fn map_tuple_conflict(err: sqlx::Error, tuple: &RemoteTuple) -> MetadataError {
    // SQLite: "UNIQUE constraint failed: files.remote_path, files.remote_filename, files.remote_version"
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
        && db_err.message().contains("files.remote_path")
    {
        tracing::debug!(tuple = %tuple, "Remote tuple already taken");
        return MetadataError::Conflict(tuple.clone());
    }
    err.into()
}

pub(crate) async fn fetch_row_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> MetadataResult<Option<FileRow>> {
    let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub(crate) async fn fetch_row_by_tuple(
    conn: &mut SqliteConnection,
    tuple: &RemoteTuple,
) -> MetadataResult<Option<FileRow>> {
    let row = sqlx::query_as::<_, FileRow>(
        "SELECT * FROM files WHERE remote_path = ? AND remote_filename = ? AND remote_version = ?",
    )
    .bind(&tuple.remote_path)
    .bind(&tuple.remote_filename)
    .bind(&tuple.remote_version)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub(crate) async fn load_tags(
    conn: &mut SqliteConnection,
    file_id: &str,
) -> MetadataResult<BTreeSet<String>> {
    let tags: Vec<String> = sqlx::query_scalar("SELECT tag FROM file_tags WHERE file_id = ?")
        .bind(file_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(tags.into_iter().collect())
}

/// Load a row's tags and convert it into a record.
pub(crate) async fn load_record(
    conn: &mut SqliteConnection,
    row: FileRow,
) -> MetadataResult<FileRecord> {
    let tags = load_tags(conn, &row.id).await?;
    Ok(row.into_record(tags))
}

/// Convert many rows into records, loading their tags in batches.
pub(crate) async fn attach_tags(
    conn: &mut SqliteConnection,
    rows: Vec<FileRow>,
) -> MetadataResult<Vec<FileRecord>> {
    let mut by_file: HashMap<String, BTreeSet<String>> = HashMap::new();
    for batch in rows.chunks(TAG_BATCH) {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT file_id, tag FROM file_tags WHERE file_id IN (");
        let mut ids = qb.separated(", ");
        for row in batch {
            ids.push_bind(row.id.clone());
        }
        ids.push_unseparated(")");

        let tag_rows = qb.build_query_as::<TagRow>().fetch_all(&mut *conn).await?;
        for tag_row in tag_rows {
            by_file.entry(tag_row.file_id).or_default().insert(tag_row.tag);
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = by_file.remove(&row.id).unwrap_or_default();
            row.into_record(tags)
        })
        .collect())
}

pub(crate) async fn insert_tags(
    conn: &mut SqliteConnection,
    file_id: &str,
    tags: &BTreeSet<String>,
) -> MetadataResult<()> {
    for tag in tags {
        sqlx::query("INSERT OR IGNORE INTO file_tags (file_id, tag) VALUES (?, ?)")
            .bind(file_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn delete_all_tags(conn: &mut SqliteConnection, file_id: &str) -> MetadataResult<()> {
    sqlx::query("DELETE FROM file_tags WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Refresh `updated` so it strictly increases. Fails with `NotFound` for
/// unknown ids.
pub(crate) async fn touch(conn: &mut SqliteConnection, file_id: &str) -> MetadataResult<()> {
    let result = sqlx::query("UPDATE files SET updated = MAX(?, updated + 1) WHERE id = ?")
        .bind(now_millis())
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(MetadataError::NotFound(format!("file {file_id}")));
    }
    Ok(())
}
