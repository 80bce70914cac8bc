//! Database models mapping to the metadata schema.

use r2index_core::FileRecord;
use serde_json::{Map, Value};
use sqlx::FromRow;
use sqlx::types::Json;
use std::collections::BTreeSet;

/// Row of the `files` table.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: String,
    pub name: Option<String>,
    pub category: String,
    pub entity: String,
    pub extension: String,
    pub media_type: String,
    pub remote_path: String,
    pub remote_filename: String,
    pub remote_version: String,
    pub metadata_path: Option<String>,
    pub size: Option<i64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
    pub extra: Json<Map<String, Value>>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
    pub created: i64,
    pub updated: i64,
}

impl FileRow {
    /// Attach tags and convert into the public record shape.
    pub fn into_record(self, tags: BTreeSet<String>) -> FileRecord {
        FileRecord {
            id: self.id,
            name: self.name,
            category: self.category,
            entity: self.entity,
            extension: self.extension,
            media_type: self.media_type,
            remote_path: self.remote_path,
            remote_filename: self.remote_filename,
            remote_version: self.remote_version,
            metadata_path: self.metadata_path,
            // Sizes are validated to fit i64 on the way in.
            size: self.size.and_then(|s| u64::try_from(s).ok()),
            md5: self.md5,
            sha1: self.sha1,
            sha256: self.sha256,
            sha512: self.sha512,
            extra: self.extra.0,
            deprecated: self.deprecated,
            deprecation_reason: self.deprecation_reason,
            created: self.created,
            updated: self.updated,
            tags,
        }
    }
}

/// Row of the `file_tags` association table.
#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub file_id: String,
    pub tag: String,
}

/// Commit position of one node relative to the primary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReplicaStatus {
    pub name: String,
    pub seq: u64,
    /// Commits the replica has not applied yet.
    pub lag: u64,
}
