use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_cas::BlobHash;

/// A version of a dataset.
///
/// Commits are stored content addressed as well: the hash of a commit is the
/// hash of its JSON encoding. Because the metadata map is ordered, encoding
/// the same commit twice always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// The hash of the blob this version points to.
    pub value: BlobHash,

    /// The commits this version was built on top of. Empty for the first
    /// commit of a dataset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<BlobHash>,

    /// Information about the commit.
    pub meta: CommitMeta,
}

impl Commit {
    /// Encodes the commit in its canonical form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Computes the content address of this commit.
    pub fn hash(&self) -> Result<BlobHash, serde_json::Error> {
        Ok(BlobHash::of(self.to_bytes()?))
    }
}

/// The keys of [`CommitMeta`] that cannot be used for extra entries.
pub const RESERVED_META_KEYS: [&str; 2] = ["date", "message"];

/// An extra metadata entry used the key of a well known field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is reserved and cannot be used as a metadata key")]
pub struct ReservedKeyError(pub String);

/// Metadata recorded with a commit.
///
/// Apart from the date and an optional message, arbitrary additional entries
/// can be stored. They are kept flat next to the well known keys, so the keys
/// in [`RESERVED_META_KEYS`] are refused for extra entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMeta {
    /// When the commit was created.
    pub date: DateTime<Utc>,

    /// A human readable description of the commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Any additional entries.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CommitMeta {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitMeta {
    /// Metadata dated now without a message or extra entries.
    pub fn new() -> Self {
        Self {
            date: Utc::now(),
            message: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Sets the date of the commit.
    pub fn with_date(self, date: DateTime<Utc>) -> Self {
        Self { date, ..self }
    }

    /// Sets the message of the commit.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Adds an extra entry, replacing any previous value for the same key.
    pub fn with_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self, ReservedKeyError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Adds an extra entry, returning the value it replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, ReservedKeyError> {
        let key = key.into();
        if RESERVED_META_KEYS.contains(&key.as_str()) {
            return Err(ReservedKeyError(key));
        }
        Ok(self.extra.insert(key, value.into()))
    }
}

/// Options that control how a commit is created.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// The metadata to record with the commit.
    pub meta: CommitMeta,
}

impl CommitOptions {
    /// Commit options with the given metadata.
    pub fn with_meta(meta: CommitMeta) -> Self {
        Self { meta }
    }
}
