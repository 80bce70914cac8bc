//! File record repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use r2index_core::{FileCreate, FileRecord, FileUpdate, RemoteTuple};

/// Repository for file record CRUD.
///
/// Uniqueness of the remote tuple is enforced by the storage layer: a
/// duplicate insert or update fails with `MetadataError::Conflict` and leaves
/// the store unchanged.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Create a record. Stamps `created`/`updated` and attaches the given tags.
    async fn create_file(&self, input: &FileCreate) -> MetadataResult<FileRecord>;

    /// Get a record by ID.
    async fn get_file(&self, id: &str) -> MetadataResult<FileRecord>;

    /// Get a record by its remote tuple.
    async fn get_file_by_tuple(&self, tuple: &RemoteTuple) -> MetadataResult<FileRecord>;

    /// Replace the supplied fields of a record. Supplied tags replace the
    /// whole tag set.
    async fn update_file(&self, id: &str, update: &FileUpdate) -> MetadataResult<FileRecord>;

    /// Delete a record and all of its tags.
    async fn delete_file(&self, id: &str) -> MetadataResult<()>;

    /// Delete the record identified by a remote tuple, with its tags.
    async fn delete_file_by_tuple(&self, tuple: &RemoteTuple) -> MetadataResult<()>;
}
