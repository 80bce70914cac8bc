//! Search and aggregation repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use r2index_core::config::SearchConfig;
use r2index_core::{FileFilter, FileIndex, GroupField, GroupedResult, Pagination, SearchPage, SearchQuery};
use serde::Serialize;

/// Repository for filtered, paginated and grouped views over records.
///
/// Records are ordered by `updated` descending, ties broken by `id`
/// ascending, so pages stay stable while older records are edited.
#[async_trait]
pub trait SearchRepo: Send + Sync {
    /// One page of records matching `filter`, plus the unpaginated match count.
    async fn search(&self, filter: &FileFilter, page: Pagination) -> MetadataResult<SearchPage>;

    /// Count matching records per distinct value of `group_by`.
    async fn search_grouped(
        &self,
        filter: &FileFilter,
        group_by: GroupField,
    ) -> MetadataResult<GroupedResult>;

    /// All matching records nested by category and entity.
    async fn index(&self, filter: &FileFilter) -> MetadataResult<FileIndex>;

    /// Validate a raw client query and run it as a page or grouped search.
    ///
    /// `group_by` is checked against the allow-list before any SQL is built.
    async fn query(&self, query: &SearchQuery, limits: &SearchConfig) -> MetadataResult<SearchOutcome> {
        let parsed = query.parse(limits)?;
        match parsed.group_by {
            Some(field) => Ok(SearchOutcome::Grouped(
                self.search_grouped(&parsed.filter, field).await?,
            )),
            None => Ok(SearchOutcome::Page(
                self.search(&parsed.filter, parsed.pagination).await?,
            )),
        }
    }
}

/// Result of a raw client query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Page(SearchPage),
    Grouped(GroupedResult),
}
