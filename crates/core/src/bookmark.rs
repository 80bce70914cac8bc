//! Consistency bookmarks.
//!
//! A bookmark names a commit point of the replicated store. Clients carry the
//! latest bookmark they were handed and present it on their next operation so
//! that the operation observes everything their earlier operations wrote.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque consistency checkpoint, encoded as `v1-<16 hex digits>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bookmark(u64);

impl Bookmark {
    const PREFIX: &'static str = "v1-";

    /// Create a bookmark for a commit sequence number.
    pub fn from_seq(seq: u64) -> Self {
        Self(seq)
    }

    /// The commit sequence number this bookmark stands for.
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl FromStr for Bookmark {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let digits = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| crate::Error::InvalidBookmark(format!("missing {} prefix", Self::PREFIX)))?;
        if digits.len() != 16 {
            return Err(crate::Error::InvalidBookmark(format!(
                "expected 16 hex digits, got {}",
                digits.len()
            )));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| crate::Error::InvalidBookmark(e.to_string()))
    }
}

impl TryFrom<String> for Bookmark {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<Bookmark> for String {
    fn from(bookmark: Bookmark) -> Self {
        bookmark.to_string()
    }
}

impl fmt::Debug for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bookmark({})", self.0)
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:016x}", Self::PREFIX, self.0)
    }
}
