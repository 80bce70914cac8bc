//! Core domain types for the r2index file metadata registry.
//!
//! This crate defines the data model shared by the metadata store and its
//! front ends:
//! - File records, their remote tuple natural key and mutation payloads
//! - Search filters, pagination and the grouping allow-list
//! - Consistency bookmarks exchanged with clients
//! - Streaming checksum computation
//! - Configuration types

pub mod bookmark;
pub mod checksum;
pub mod config;
pub mod error;
pub mod query;
pub mod record;

pub use bookmark::Bookmark;
pub use checksum::{ChecksumAlgorithm, Checksums};
pub use error::{Error, Result};
pub use query::{
    FileFilter, FileIndex, GroupCount, GroupField, GroupedResult, Pagination, ParsedQuery,
    SearchPage, SearchQuery,
};
pub use record::{FileCreate, FileRecord, FileUpdate, RemoteTuple, normalize_tags};

/// Default page size for searches.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Upper bound on the page size a client may request.
pub const MAX_PAGE_LIMIT: u32 = 1000;
