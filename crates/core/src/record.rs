//! File records and the payloads that create and mutate them.

use crate::checksum::{ChecksumAlgorithm, Checksums};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 128;

/// The natural key of a record: one exact version of one remote artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTuple {
    pub remote_path: String,
    pub remote_filename: String,
    pub remote_version: String,
}

impl RemoteTuple {
    pub fn new(
        remote_path: impl Into<String>,
        remote_filename: impl Into<String>,
        remote_version: impl Into<String>,
    ) -> Self {
        Self {
            remote_path: remote_path.into(),
            remote_filename: remote_filename.into(),
            remote_version: remote_version.into(),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        require_non_empty("remote_path", &self.remote_path)?;
        require_non_empty("remote_filename", &self.remote_filename)?;
        require_non_empty("remote_version", &self.remote_version)
    }
}

impl fmt::Display for RemoteTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.remote_path, self.remote_filename, self.remote_version
        )
    }
}

/// A file record as returned to callers, with its tags inlined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
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
    pub size: Option<u64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
    /// Creation time in epoch milliseconds.
    pub created: i64,
    /// Last update time in epoch milliseconds.
    pub updated: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl FileRecord {
    pub fn remote_tuple(&self) -> RemoteTuple {
        RemoteTuple::new(
            self.remote_path.clone(),
            self.remote_filename.clone(),
            self.remote_version.clone(),
        )
    }

    pub fn checksum(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        match algorithm {
            ChecksumAlgorithm::Md5 => self.md5.as_deref(),
            ChecksumAlgorithm::Sha1 => self.sha1.as_deref(),
            ChecksumAlgorithm::Sha256 => self.sha256.as_deref(),
            ChecksumAlgorithm::Sha512 => self.sha512.as_deref(),
        }
    }

    /// Fields whose stored value disagrees with `actual`.
    ///
    /// Only size and digests the record carries are compared.
    pub fn mismatches(&self, actual: &Checksums) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.size.is_some_and(|size| size != actual.size) {
            fields.push("size");
        }
        for algorithm in ChecksumAlgorithm::ALL {
            if self
                .checksum(algorithm)
                .is_some_and(|stored| stored != actual.get(algorithm))
            {
                fields.push(algorithm.as_str());
            }
        }
        fields
    }
}

/// Payload for creating a record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCreate {
    #[serde(default)]
    pub name: Option<String>,
    pub category: String,
    pub entity: String,
    pub extension: String,
    pub media_type: String,
    pub remote_path: String,
    pub remote_filename: String,
    pub remote_version: String,
    #[serde(default)]
    pub metadata_path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub sha512: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FileCreate {
    pub fn remote_tuple(&self) -> RemoteTuple {
        RemoteTuple::new(
            self.remote_path.clone(),
            self.remote_filename.clone(),
            self.remote_version.clone(),
        )
    }

    /// Validate the payload and return a normalized copy.
    ///
    /// Checksums are lowercased and tags trimmed and deduplicated.
    pub fn validate(&self) -> crate::Result<Self> {
        require_non_empty("category", &self.category)?;
        require_non_empty("entity", &self.entity)?;
        require_non_empty("extension", &self.extension)?;
        require_non_empty("media_type", &self.media_type)?;
        self.remote_tuple().validate()?;
        validate_size(self.size)?;

        Ok(Self {
            md5: normalize_checksum(ChecksumAlgorithm::Md5, self.md5.as_deref())?,
            sha1: normalize_checksum(ChecksumAlgorithm::Sha1, self.sha1.as_deref())?,
            sha256: normalize_checksum(ChecksumAlgorithm::Sha256, self.sha256.as_deref())?,
            sha512: normalize_checksum(ChecksumAlgorithm::Sha512, self.sha512.as_deref())?,
            tags: normalize_tags(&self.tags)?.into_iter().collect(),
            ..self.clone()
        })
    }
}

/// Partial update payload. `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub remote_path: Option<String>,
    #[serde(default)]
    pub remote_filename: Option<String>,
    #[serde(default)]
    pub remote_version: Option<String>,
    #[serde(default)]
    pub metadata_path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub sha512: Option<String>,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
    #[serde(default)]
    pub deprecated: Option<bool>,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
    /// Replaces the whole tag set when present.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl FileUpdate {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when the update touches any part of the remote tuple.
    pub fn touches_remote_tuple(&self) -> bool {
        self.remote_path.is_some() || self.remote_filename.is_some() || self.remote_version.is_some()
    }

    /// Validate the supplied fields and return a normalized copy.
    pub fn validate(&self) -> crate::Result<Self> {
        let required = [
            ("category", &self.category),
            ("entity", &self.entity),
            ("extension", &self.extension),
            ("media_type", &self.media_type),
            ("remote_path", &self.remote_path),
            ("remote_filename", &self.remote_filename),
            ("remote_version", &self.remote_version),
        ];
        for (field, value) in required {
            if let Some(value) = value {
                require_non_empty(field, value)?;
            }
        }
        validate_size(self.size)?;

        let tags = match &self.tags {
            Some(tags) => Some(normalize_tags(tags)?.into_iter().collect()),
            None => None,
        };

        Ok(Self {
            md5: normalize_checksum(ChecksumAlgorithm::Md5, self.md5.as_deref())?,
            sha1: normalize_checksum(ChecksumAlgorithm::Sha1, self.sha1.as_deref())?,
            sha256: normalize_checksum(ChecksumAlgorithm::Sha256, self.sha256.as_deref())?,
            sha512: normalize_checksum(ChecksumAlgorithm::Sha512, self.sha512.as_deref())?,
            tags,
            ..self.clone()
        })
    }
}

/// Trim, drop empties and deduplicate a list of tags.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> crate::Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "tag exceeds {MAX_TAG_LEN} bytes: {tag}"
            )));
        }
        out.insert(tag.to_string());
    }
    Ok(out)
}

fn require_non_empty(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_size(size: Option<u64>) -> crate::Result<()> {
    match size {
        Some(size) if i64::try_from(size).is_err() => Err(crate::Error::InvalidInput(format!(
            "size {size} is out of range"
        ))),
        _ => Ok(()),
    }
}

fn normalize_checksum(
    algorithm: ChecksumAlgorithm,
    digest: Option<&str>,
) -> crate::Result<Option<String>> {
    digest.map(|d| algorithm.normalize_digest(d)).transpose()
}
