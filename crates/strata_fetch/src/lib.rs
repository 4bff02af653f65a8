#![deny(missing_docs)]

//! Fetches the content of a url, a local file or standard input and commits
//! it as the new head of a dataset.
//!
//! Every commit made by a fetch records where its content came from (see
//! [`FetchMetadata`]). When the same url is fetched again the recorded `ETag`
//! is sent along with the request so a server can answer with
//! `304 Not Modified`, in which case nothing is written at all.
//!
//! Content is streamed into the database and never buffered in memory as a
//! whole. Committing is optimistic: if another writer moved the head of the
//! dataset while the content was streaming, [`CommitOutcome::ConflictDetected`]
//! is returned and nothing is committed.

mod error;
#[cfg(feature = "indicatif")]
mod indicatif;
mod ingest;
mod metadata;
mod progress;
mod redaction;
mod reporter;
mod source;
mod status;

pub use error::{ErrorKind, IngestError, SourceError};
#[cfg(feature = "indicatif")]
pub use self::indicatif::{IndicatifReporter, IndicatifReporterBuilder};
pub use ingest::{ingest, ingest_source, CommitOutcome, IngestMode, IngestOptions};
pub use metadata::{FetchMetadata, ETAG_KEY, FILE_KEY, URL_KEY};
pub use progress::ProgressReader;
pub use redaction::{redact_url, DEFAULT_REDACTION_STR};
pub use reporter::Reporter;
pub use source::{resolve, Resolution, SourceDescriptor, SourceTarget};
pub use status::{format_status, StatusLine};
