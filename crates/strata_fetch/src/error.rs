use std::{io, path::PathBuf};

use reqwest::StatusCode;
use strata_dataset::{CommitError, DatabaseError};

use crate::redaction::redact_url;

/// An error that occurs while opening the source of an ingest.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum SourceError {
    #[error("invalid url '{}'", redact_url(.url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to request '{}'", redact_url(.url))]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("failed to open '{}'", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read the metadata of '{}'", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An error that can occur while ingesting a source into a dataset.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("fetching '{}' failed with status {status}", redact_url(.url))]
    Fetch { url: String, status: StatusCode },

    #[error("the fetch metadata of the current head could not be decoded")]
    Decode(#[source] serde_json::Error),

    #[error("failed to store the fetched content")]
    Stage(#[source] DatabaseError),

    #[error("failed to commit the fetched content")]
    Commit(#[source] CommitError),

    #[error("failed to write the fetched content")]
    Write(#[source] DatabaseError),
}

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source could not be opened or requested.
    Source,
    /// The server responded with an error status.
    Fetch,
    /// Metadata of a previous fetch could not be read.
    Decode,
    /// Storing the content failed.
    Commit,
}

impl IngestError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Source(_) => ErrorKind::Source,
            IngestError::Fetch { .. } => ErrorKind::Fetch,
            IngestError::Decode(_) => ErrorKind::Decode,
            IngestError::Stage(_) | IngestError::Commit(_) | IngestError::Write(_) => {
                ErrorKind::Commit
            }
        }
    }
}
