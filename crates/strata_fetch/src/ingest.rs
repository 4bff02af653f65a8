use std::sync::Arc;

use reqwest_middleware::ClientWithMiddleware;
use strata_dataset::{BlobHash, CommitError, CommitMeta, CommitOptions, Database, Dataset};
use tracing::instrument;

use crate::{
    error::IngestError,
    metadata::FetchMetadata,
    progress::ProgressReader,
    source::{resolve, Resolution, SourceDescriptor, SourceTarget},
    Reporter,
};

/// What to do with the content once it is stored.
#[derive(Debug, Clone)]
pub enum IngestMode {
    /// Commit the content as the new head of the dataset, recording the given
    /// metadata alongside the metadata of the fetch.
    Commit(CommitMeta),

    /// Only store the content. No dataset is modified.
    WriteOnly,
}

impl Default for IngestMode {
    fn default() -> Self {
        IngestMode::Commit(CommitMeta::new())
    }
}

/// Options for [`ingest`].
#[derive(Default, Clone)]
pub struct IngestOptions {
    /// What to do with the content.
    pub mode: IngestMode,

    /// Notified about the progress of the ingest. Progress is not tracked if
    /// this is `None`.
    pub reporter: Option<Arc<dyn Reporter>>,
}

impl IngestOptions {
    /// Sets the mode.
    pub fn with_mode(self, mode: IngestMode) -> Self {
        Self { mode, ..self }
    }

    /// Sets the reporter.
    pub fn with_reporter(self, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter: Some(reporter),
            ..self
        }
    }
}

/// The result of a successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit with the given hash is the head of the dataset.
    Committed(BlobHash),

    /// The content was stored under the given hash without committing it.
    WrittenOnly(BlobHash),

    /// The server reported that the content did not change since the last
    /// fetch. Nothing was written.
    SkippedUnchanged,

    /// The head of the dataset moved while the content was streamed. Nothing
    /// was committed.
    ConflictDetected,
}

/// Fetches `target` and stores it in `database`, on top of the head that
/// `dataset` was read at.
///
/// The fetch metadata recorded in the current head is used to skip the fetch
/// of urls that did not change.
#[instrument(skip_all, fields(dataset = dataset.name()))]
pub async fn ingest(
    database: &Database,
    dataset: &Dataset,
    target: &SourceTarget,
    client: &ClientWithMiddleware,
    options: IngestOptions,
) -> Result<CommitOutcome, IngestError> {
    let previous = dataset
        .head()
        .map(FetchMetadata::from_commit)
        .transpose()
        .map_err(IngestError::Decode)?;

    let source = match resolve(target, previous.as_ref(), client).await? {
        Resolution::Ready(source) => source,
        Resolution::Unchanged => {
            tracing::info!("content unchanged since the last fetch, nothing written");
            return Ok(CommitOutcome::SkippedUnchanged);
        }
    };

    ingest_source(database, dataset, source, options).await
}

/// Stores an already opened source. See [`ingest`].
pub async fn ingest_source(
    database: &Database,
    dataset: &Dataset,
    source: SourceDescriptor,
    options: IngestOptions,
) -> Result<CommitOutcome, IngestError> {
    let SourceDescriptor {
        reader,
        content_length,
        metadata,
    } = source;

    let staged = match &options.reporter {
        Some(reporter) => {
            reporter.on_ingest_start(content_length);
            let mut reader = ProgressReader::new(reader, |bytes| {
                reporter.on_ingest_progress(bytes, content_length);
            });
            let staged = database.stage_blob(&mut reader).await;
            if staged.is_err() {
                reporter.on_ingest_aborted();
            }
            staged
        }
        None => {
            let mut reader = reader;
            database.stage_blob(&mut reader).await
        }
    }
    .map_err(IngestError::Stage)?;
    tracing::debug!("staged {} bytes as {}", staged.len(), staged.hash());

    let result = match options.mode {
        IngestMode::WriteOnly => database
            .write_value(staged)
            .await
            .map(CommitOutcome::WrittenOnly)
            .map_err(IngestError::Write),
        IngestMode::Commit(meta) => {
            let meta = FetchMetadata::from_entries(&metadata).apply_to(meta);
            match database
                .commit(dataset, staged, CommitOptions::with_meta(meta))
                .await
            {
                Ok(head) => Ok(CommitOutcome::Committed(head.hash)),
                Err(CommitError::MergeNeeded { .. }) => {
                    tracing::warn!(
                        "the head of '{}' moved while fetching, nothing was committed",
                        dataset.name()
                    );
                    Ok(CommitOutcome::ConflictDetected)
                }
                Err(err) => Err(IngestError::Commit(err)),
            }
        }
    };

    if let Some(reporter) = &options.reporter {
        match &result {
            Ok(outcome) => reporter.on_ingest_complete(outcome),
            Err(_) => reporter.on_ingest_aborted(),
        }
    }

    result
}
