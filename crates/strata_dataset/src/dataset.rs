use std::path::PathBuf;

use strata_cas::BlobHash;

use crate::{Commit, DatabaseError};

/// A snapshot of a named dataset.
///
/// The head is captured when the snapshot is taken and does not follow later
/// updates. Committing against a snapshot whose head has since moved fails
/// with [`crate::CommitError::MergeNeeded`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    head: Option<Head>,
}

/// The commit a dataset pointed at when it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    /// The hash of the commit.
    pub hash: BlobHash,

    /// The commit itself.
    pub commit: Commit,
}

impl Dataset {
    pub(crate) fn new(name: String, head: Option<Head>) -> Self {
        Self { name, head }
    }

    /// The name of the dataset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the dataset had at least one commit when it was read.
    pub fn has_head(&self) -> bool {
        self.head.is_some()
    }

    /// The most recent commit of the dataset, if any.
    pub fn head(&self) -> Option<&Commit> {
        self.head.as_ref().map(|head| &head.commit)
    }

    /// The hash of the most recent commit of the dataset, if any.
    pub fn head_hash(&self) -> Option<BlobHash> {
        self.head.as_ref().map(|head| head.hash)
    }
}

/// Checks that `name` can be used as a dataset name and returns the relative
/// path of its head file.
///
/// Names consist of `/` separated segments of ASCII letters, digits, `-` and
/// `_`.
pub(crate) fn ref_path(name: &str) -> Result<PathBuf, DatabaseError> {
    let invalid = |reason| DatabaseError::InvalidDatasetName(name.to_owned(), reason);

    if name.is_empty() {
        return Err(invalid("the name is empty"));
    }

    let mut path = PathBuf::new();
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(invalid("the name contains an empty segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "only ascii letters, digits, '-', '_' and '/' are allowed",
            ));
        }
        path.push(segment);
    }

    Ok(path)
}
