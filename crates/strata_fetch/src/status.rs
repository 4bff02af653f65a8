use std::time::{Duration, Instant};

use humansize::{format_size, DECIMAL};

/// Formats a human readable throughput line, e.g.
/// `1.20 MB of 4.80 MB written in 3s (400 kB/s)...`.
///
/// A zero `elapsed` results in a rate of zero.
pub fn format_status(bytes_seen: u64, total: Option<u64>, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let rate = if seconds > 0.0 {
        (bytes_seen as f64 / seconds) as u64
    } else {
        0
    };
    let total = total.map_or_else(|| String::from("(unknown)"), |t| format_size(t, DECIMAL));
    format!(
        "{} of {} written in {}s ({}/s)...",
        format_size(bytes_seen, DECIMAL),
        total,
        elapsed.as_secs(),
        format_size(rate, DECIMAL)
    )
}

/// Remembers when an ingest started and how many bytes it expects so that
/// status lines can be rendered from a byte count alone.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    start: Instant,
    total: Option<u64>,
}

impl StatusLine {
    /// Constructs a status line for an ingest that started at `start`.
    pub fn new(start: Instant, total: Option<u64>) -> Self {
        Self { start, total }
    }

    /// The instant the ingest started.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// The declared total, if known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Renders the line for `bytes_seen` at the current time.
    pub fn render(&self, bytes_seen: u64) -> String {
        format_status(bytes_seen, self.total, self.start.elapsed())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5, Some(10), 1, "5 B of 10 B written in 1s (5 B/s)...")]
    #[case(5, None, 1, "5 B of (unknown) written in 1s (5 B/s)...")]
    #[case(5, Some(5), 0, "5 B of 5 B written in 0s (0 B/s)...")]
    #[case(0, None, 3, "0 B of (unknown) written in 3s (0 B/s)...")]
    #[case(900, Some(900), 3, "900 B of 900 B written in 3s (300 B/s)...")]
    fn test_format_status(
        #[case] seen: u64,
        #[case] total: Option<u64>,
        #[case] seconds: u64,
        #[case] expected: &str,
    ) {
        assert_eq!(
            format_status(seen, total, Duration::from_secs(seconds)),
            expected
        );
    }

    #[test]
    fn test_large_sizes_are_humanized() {
        let line = format_status(2_000_000, Some(4_000_000), Duration::from_secs(2));
        assert_eq!(line, "2 MB of 4 MB written in 2s (1 MB/s)...");
    }

    #[test]
    fn test_status_line_uses_explicit_start() {
        let line = StatusLine::new(Instant::now(), Some(10));
        assert!(line.render(5).starts_with("5 B of 10 B written in 0s"));
    }
}
