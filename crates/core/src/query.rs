//! Search filters, pagination, grouping and their result shapes.

use crate::config::SearchConfig;
use crate::record::{FileRecord, normalize_tags};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Conjunctive record filter. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub category: Option<String>,
    pub entity: Option<String>,
    pub extension: Option<String>,
    pub media_type: Option<String>,
    pub deprecated: Option<bool>,
    /// A record must carry every one of these tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl FileFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Offset/limit page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    pub fn new(limit: u32, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Clamp the limit into `[1, max_limit]`.
    pub fn clamped(self, max_limit: u32) -> Self {
        Self {
            limit: self.limit.clamp(1, max_limit.max(1)),
            offset: self.offset,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: crate::DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Fields a grouped search may aggregate on.
///
/// This is a closed set: the column expression for each variant is a static
/// string, so nothing derived from client input reaches identifier position in
/// the generated SQL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Category,
    Entity,
    Extension,
    MediaType,
    Deprecated,
}

impl GroupField {
    pub const ALL: [Self; 5] = [
        Self::Category,
        Self::Entity,
        Self::Extension,
        Self::MediaType,
        Self::Deprecated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Entity => "entity",
            Self::Extension => "extension",
            Self::MediaType => "media_type",
            Self::Deprecated => "deprecated",
        }
    }
}

impl FromStr for GroupField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidGroupField(s.to_string()))
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw search query as received from a client: every value is still text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub category: Option<String>,
    pub entity: Option<String>,
    pub extension: Option<String>,
    pub media_type: Option<String>,
    /// "true" or "false".
    pub deprecated: Option<String>,
    /// Comma-joined tag list.
    pub tags: Option<String>,
    pub group_by: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// A validated search query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuery {
    pub filter: FileFilter,
    pub pagination: Pagination,
    pub group_by: Option<GroupField>,
}

impl SearchQuery {
    /// Validate the raw query into typed filter, pagination and grouping.
    pub fn parse(&self, limits: &SearchConfig) -> crate::Result<ParsedQuery> {
        let group_by = non_empty(&self.group_by)
            .map(GroupField::from_str)
            .transpose()?;

        let deprecated = match non_empty(&self.deprecated) {
            None => None,
            Some("true") | Some("1") => Some(true),
            Some("false") | Some("0") => Some(false),
            Some(other) => {
                return Err(crate::Error::InvalidFilter(format!(
                    "deprecated must be true or false, got {other:?}"
                )));
            }
        };

        let tags = match non_empty(&self.tags) {
            Some(joined) => normalize_tags(&joined.split(',').collect::<Vec<_>>())?,
            None => BTreeSet::new(),
        };

        let limit = match non_empty(&self.limit) {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| crate::Error::InvalidFilter(format!("limit {raw:?}: {e}")))?,
            None => limits.default_limit,
        };
        let offset = match non_empty(&self.offset) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| crate::Error::InvalidFilter(format!("offset {raw:?}: {e}")))?,
            None => 0,
        };

        Ok(ParsedQuery {
            filter: FileFilter {
                category: non_empty(&self.category).map(str::to_string),
                entity: non_empty(&self.entity).map(str::to_string),
                extension: non_empty(&self.extension).map(str::to_string),
                media_type: non_empty(&self.media_type).map(str::to_string),
                deprecated,
                tags,
            },
            pagination: Pagination::new(limit, offset).clamped(limits.max_limit),
            group_by,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// One page of search results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub records: Vec<FileRecord>,
    /// Matching records before pagination.
    pub total: u64,
}

/// Count of matching records for one value of the grouped field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub value: String,
    pub count: u64,
}

/// Result of a grouped search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedResult {
    pub group_by: GroupField,
    pub groups: Vec<GroupCount>,
    /// Sum of all group counts.
    pub total: u64,
}

/// Matching records nested by category, then entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileIndex {
    pub categories: BTreeMap<String, BTreeMap<String, Vec<FileRecord>>>,
    pub total: u64,
}

impl FileIndex {
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index
                .categories
                .entry(record.category.clone())
                .or_default()
                .entry(record.entity.clone())
                .or_default()
                .push(record);
            index.total += 1;
        }
        index
    }
}
