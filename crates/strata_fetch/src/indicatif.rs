use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use crate::{status::StatusLine, CommitOutcome, Reporter};

/// A builder to construct an [`IndicatifReporter`].
#[derive(Default, Clone)]
pub struct IndicatifReporterBuilder {
    multi_progress: Option<MultiProgress>,
    start: Option<Instant>,
}

impl IndicatifReporterBuilder {
    /// Sets the [`indicatif::MultiProgress`] to add the progress bar to.
    pub fn with_multi_progress(self, multi_progress: MultiProgress) -> Self {
        Self {
            multi_progress: Some(multi_progress),
            ..self
        }
    }

    /// Sets the instant the rate is computed from. Defaults to the moment
    /// [`IndicatifReporterBuilder::finish`] is called.
    pub fn with_start(self, start: Instant) -> Self {
        Self {
            start: Some(start),
            ..self
        }
    }

    /// Finish building [`IndicatifReporter`].
    pub fn finish(self) -> IndicatifReporter {
        IndicatifReporter {
            multi_progress: self.multi_progress.unwrap_or_default(),
            start: self.start.unwrap_or_else(Instant::now),
            inner: Mutex::new(None),
        }
    }
}

/// A [`Reporter`] that renders a throughput line as an indicatif spinner.
pub struct IndicatifReporter {
    multi_progress: MultiProgress,
    start: Instant,
    inner: Mutex<Option<(ProgressBar, StatusLine)>>,
}

impl IndicatifReporter {
    /// Returns a builder.
    pub fn builder() -> IndicatifReporterBuilder {
        IndicatifReporterBuilder::default()
    }
}

impl Reporter for IndicatifReporter {
    fn on_ingest_start(&self, total: Option<u64>) {
        let status = StatusLine::new(self.start, total);
        let pb = self.multi_progress.add(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::with_template("{spinner:.green} {msg}")
                    .expect("failed to create progress style"),
            ),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(status.render(0));
        *self.inner.lock() = Some((pb, status));
    }

    fn on_ingest_progress(&self, bytes: u64, _total: Option<u64>) {
        if let Some((pb, status)) = self.inner.lock().as_ref() {
            pb.set_message(status.render(bytes));
        }
    }

    fn on_ingest_complete(&self, _outcome: &CommitOutcome) {
        if let Some((pb, _)) = self.inner.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn on_ingest_aborted(&self) {
        if let Some((pb, _)) = self.inner.lock().take() {
            pb.abandon();
        }
    }
}
