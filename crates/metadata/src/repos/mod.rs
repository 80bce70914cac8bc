//! Repository traits for metadata operations.

pub mod files;
pub mod search;
pub mod tags;

pub use files::FileRepo;
pub use search::{SearchOutcome, SearchRepo};
pub use tags::TagRepo;
