//! Tag repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Repository for the record/tag association.
///
/// All mutations are idempotent per (record, tag) pair and return the
/// record's resulting tag set.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Replace the record's tags with `tags`.
    async fn set_tags(&self, file_id: &str, tags: &[String]) -> MetadataResult<BTreeSet<String>>;

    /// Add `tags` to the record. Tags already present are left alone.
    async fn add_tags(&self, file_id: &str, tags: &[String]) -> MetadataResult<BTreeSet<String>>;

    /// Remove `tags` from the record. Tags not present are ignored.
    async fn remove_tags(&self, file_id: &str, tags: &[String])
    -> MetadataResult<BTreeSet<String>>;

    /// Tags currently attached to a record. Empty for unknown records.
    async fn get_tags(&self, file_id: &str) -> MetadataResult<BTreeSet<String>>;
}
