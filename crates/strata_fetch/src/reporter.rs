use crate::CommitOutcome;

/// A trait that can be implemented to follow the progress of an ingest.
pub trait Reporter: Send + Sync {
    /// Called when the source is open and streaming starts. `total` is
    /// `None` if the size of the source is unknown.
    fn on_ingest_start(&self, _total: Option<u64>) {}

    /// Called every time new bytes were read from the source.
    fn on_ingest_progress(&self, _bytes: u64, _total: Option<u64>) {}

    /// Called once the content is stored.
    fn on_ingest_complete(&self, _outcome: &CommitOutcome) {}

    /// Called when the ingest fails after [`Reporter::on_ingest_start`].
    fn on_ingest_aborted(&self) {}
}
