use std::{io, path::PathBuf};

use strata_cas::{BlobHash, ParseBlobHashError};

/// An error that can occur when reading from or writing to a
/// [`crate::Database`].
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum DatabaseError {
    #[error("invalid dataset name '{0}': {1}")]
    InvalidDatasetName(String, &'static str),

    #[error("failed to open database at '{}'", .0.display())]
    Open(PathBuf, #[source] io::Error),

    #[error("failed to read the head of dataset '{0}'")]
    ReadHead(String, #[source] io::Error),

    #[error("the head of dataset '{0}' is corrupt")]
    CorruptHead(String, #[source] ParseBlobHashError),

    #[error("failed to read commit {0}")]
    ReadCommit(BlobHash, #[source] io::Error),

    #[error("failed to decode commit {0}")]
    DecodeCommit(BlobHash, #[source] serde_json::Error),

    #[error("failed to stage blob")]
    StageBlob(#[source] io::Error),

    #[error("failed to write blob {0}")]
    WriteBlob(BlobHash, #[source] io::Error),

    #[error("failed to read blob {0}")]
    ReadBlob(BlobHash, #[source] io::Error),

    #[error("the operation was cancelled")]
    Cancelled,
}

/// An error that can occur when committing a new version of a dataset.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum CommitError {
    /// The head of the dataset moved after it was read. The caller has to
    /// read the dataset again and decide how to proceed.
    #[error(
        "the head of dataset '{dataset}' moved from {} to {} since it was read",
        display_head(.expected),
        display_head(.actual)
    )]
    MergeNeeded {
        dataset: String,
        expected: Option<BlobHash>,
        actual: Option<BlobHash>,
    },

    #[error("failed to lock the heads of the database")]
    Lock(#[source] io::Error),

    #[error("failed to encode commit")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write commit {0}")]
    WriteCommit(BlobHash, #[source] io::Error),

    #[error("failed to update the head of dataset '{0}'")]
    UpdateHead(String, #[source] io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn display_head(head: &Option<BlobHash>) -> String {
    head.map_or_else(|| String::from("<empty>"), |hash| hash.to_string())
}
