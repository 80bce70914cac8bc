//! Consistency-aware metadata store for r2index.
//!
//! This crate provides the data layer of the registry:
//! - File records keyed by a unique remote tuple
//! - Tags attached to records, removed with them
//! - Filtered search, grouped counts and the category/entity index
//! - Sessions that route reads across a primary and its replicas while
//!   guaranteeing read-your-writes through bookmarks

pub mod error;
pub mod models;
pub mod repos;
pub mod session;
mod sqlite;
pub mod store;

pub use error::{ErrorKind, MetadataError, MetadataResult};
pub use models::ReplicaStatus;
pub use repos::{FileRepo, SearchOutcome, SearchRepo, TagRepo};
pub use session::{Consistency, MetadataSession, Session};
pub use store::SqliteStore;

use r2index_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<SqliteStore>> {
    let store = SqliteStore::open(config).await?;
    Ok(Arc::new(store))
}
