use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use clap::{error::ErrorKind, ArgAction, CommandFactory, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indicatif::{MultiProgress, ProgressDrawTarget};
use miette::IntoDiagnostic;
use once_cell::sync::Lazy;
use reqwest_middleware::ClientWithMiddleware;
use strata_config::Resolver;
use strata_dataset::{CommitMeta, ReservedKeyError, RESERVED_META_KEYS};
use strata_fetch::{
    ingest, CommitOutcome, IndicatifReporter, IngestMode, IngestOptions, Reporter, SourceTarget,
};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

mod writer;

/// Returns a global instance of [`indicatif::MultiProgress`].
///
/// Although you can always create an instance yourself any logging will interrupt pending
/// progressbars. To fix this issue, logging has been configured in such a way to it will not
/// interfere if you use the [`indicatif::MultiProgress`] returning by this function.
pub fn global_multi_progress() -> MultiProgress {
    static GLOBAL_MP: Lazy<MultiProgress> = Lazy::new(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        mp
    });
    GLOBAL_MP.clone()
}

/// Fetch a url, a file or standard input and commit it to a dataset.
///
/// Datasets are named `<database>::<dataset>` where `<database>` is an alias
/// from a `.strata.toml` file or a path. Without a database the default
/// database of the configuration is used.
#[derive(Debug, Parser)]
#[command(name = "strata-fetch", version, about, long_about)]
struct Cli {
    /// Read the content from standard input instead of a url or path
    #[arg(long)]
    stdin: bool,

    /// Do not show a progress line while fetching
    #[arg(long)]
    no_progress: bool,

    /// Commit the content as the new head of the dataset. With
    /// `--commit=false` the content is only stored and its hash is printed.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        require_equals = true
    )]
    commit: bool,

    /// The message of the commit
    #[arg(long, short)]
    message: Option<String>,

    /// The date of the commit (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_date)]
    date: Option<DateTime<Utc>>,

    /// Additional metadata to record in the commit
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    meta: Vec<(String, String)>,

    /// An additional configuration file that takes priority over discovered
    /// `.strata.toml` files
    #[arg(long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// The url or path to fetch followed by the dataset. Only the dataset is
    /// given with `--stdin`.
    #[arg(required = true, num_args = 1..=2, value_names = ["URL_OR_PATH", "DATASET"])]
    args: Vec<String>,
}

impl Cli {
    /// Splits the positional arguments into the source and the dataset.
    fn source_and_dataset(&self) -> Result<(SourceTarget, &str), clap::Error> {
        match (self.stdin, self.args.as_slice()) {
            (true, [dataset]) => Ok((SourceTarget::Stdin, dataset.as_str())),
            (false, [source, dataset]) => {
                Ok((SourceTarget::from_arg(source), dataset.as_str()))
            }
            (true, _) => Err(Cli::command().error(
                ErrorKind::WrongNumberOfValues,
                "only a dataset is expected when reading from --stdin",
            )),
            (false, _) => Err(Cli::command().error(
                ErrorKind::WrongNumberOfValues,
                "expected a url or path followed by a dataset",
            )),
        }
    }

    fn ingest_mode(&self) -> Result<IngestMode, ReservedKeyError> {
        if !self.commit {
            return Ok(IngestMode::WriteOnly);
        }

        let mut meta = CommitMeta::new();
        if let Some(date) = self.date {
            meta = meta.with_date(date);
        }
        if let Some(message) = &self.message {
            meta = meta.with_message(message.clone());
        }
        for (key, value) in &self.meta {
            meta.insert(key.clone(), value.clone())?;
        }
        Ok(IngestMode::Commit(meta))
    }
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if RESERVED_META_KEYS.contains(&key) => Err(format!(
            "`{key}` is reserved, use --{key} to set it"
        )),
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("invalid KEY=VALUE: no `=` found in `{s}`")),
    }
}

/// Renders the line printed for a finished ingest. A conflict is turned into
/// an error so the process exits with a failure.
fn report_outcome(
    outcome: &CommitOutcome,
    dataset_target: &str,
    elapsed: Duration,
) -> miette::Result<String> {
    match outcome {
        CommitOutcome::Committed(hash) => Ok(format!(
            "{} Committed {hash} as the new head of '{dataset_target}' in {:.2}s",
            console::style(console::Emoji("✔", "")).green(),
            elapsed.as_secs_f64()
        )),
        CommitOutcome::WrittenOnly(hash) => Ok(format!("#{hash}")),
        CommitOutcome::SkippedUnchanged => {
            Ok(String::from("Content unchanged since last fetch, no commit made"))
        }
        CommitOutcome::ConflictDetected => Err(miette::miette!(
            "Could not commit, optimistic concurrency failed: '{dataset_target}' was updated while fetching"
        )),
    }
}

/// Entry point of the `strata-fetch` cli.
#[tokio::main]
async fn main() -> miette::Result<()> {
    let start = Instant::now();

    // Parse the command line arguments
    let cli = Cli::parse();
    let (target, dataset_target) = cli.source_and_dataset().unwrap_or_else(|e| e.exit());

    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env()
        .into_diagnostic()?;

    // Setup the tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer::IndicatifWriter::new(global_multi_progress()))
        .without_time()
        .finish()
        .try_init()
        .into_diagnostic()?;

    let cwd = std::env::current_dir().into_diagnostic()?;
    let resolver = Resolver::from_cwd(&cwd, cli.config.as_deref()).into_diagnostic()?;
    let (database, dataset) = resolver.open_dataset(dataset_target).into_diagnostic()?;
    tracing::debug!(
        "resolved '{dataset_target}' to dataset '{}' in {}",
        dataset.name(),
        database.root().display()
    );

    let client = ClientWithMiddleware::from(
        reqwest::Client::builder()
            .user_agent(concat!("strata-fetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .into_diagnostic()?,
    );

    let mut options = IngestOptions::default().with_mode(cli.ingest_mode().into_diagnostic()?);
    if !cli.no_progress {
        let reporter: Arc<dyn Reporter> = Arc::new(
            IndicatifReporter::builder()
                .with_multi_progress(global_multi_progress())
                .with_start(start)
                .finish(),
        );
        options = options.with_reporter(reporter);
    }

    let outcome = ingest(&database, &dataset, &target, &client, options)
        .await
        .into_diagnostic()?;

    println!(
        "{}",
        report_outcome(&outcome, dataset_target, start.elapsed())?
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use strata_dataset::BlobHash;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("strata-fetch").chain(args.iter().copied()))
    }

    #[test]
    fn test_url_and_dataset() {
        let cli = parse(&["https://example.com/data.csv", "local::daily"]).unwrap();
        let (target, dataset) = cli.source_and_dataset().unwrap();
        assert_eq!(
            target,
            SourceTarget::Http("https://example.com/data.csv".into())
        );
        assert_eq!(dataset, "local::daily");
        assert!(cli.commit);
        assert!(matches!(cli.ingest_mode(), Ok(IngestMode::Commit(_))));
    }

    #[test]
    fn test_stdin_write_only() {
        let cli = parse(&["--stdin", "--commit=false", "daily"]).unwrap();
        let (target, dataset) = cli.source_and_dataset().unwrap();
        assert_eq!(target, SourceTarget::Stdin);
        assert_eq!(dataset, "daily");
        assert!(matches!(cli.ingest_mode(), Ok(IngestMode::WriteOnly)));
    }

    #[rstest]
    #[case(&["--commit", "data.csv", "daily"], true)]
    #[case(&["--commit=true", "data.csv", "daily"], true)]
    #[case(&["--commit=false", "data.csv", "daily"], false)]
    #[case(&["data.csv", "daily"], true)]
    fn test_commit_flag(#[case] args: &[&str], #[case] expected: bool) {
        let cli = parse(args).unwrap();
        assert_eq!(cli.commit, expected);
        assert_eq!(cli.args, vec!["data.csv", "daily"]);
    }

    #[rstest]
    #[case(&["daily"])]
    #[case(&["--stdin", "data.csv", "daily"])]
    fn test_wrong_number_of_arguments(#[case] args: &[&str]) {
        let cli = parse(args).unwrap();
        let err = cli.source_and_dataset().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongNumberOfValues);
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(parse(&["a", "b", "c"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_commit_metadata() {
        let cli = parse(&[
            "--message",
            "nightly",
            "--date",
            "2024-05-01T12:00:00+02:00",
            "--meta",
            "owner=data-team",
            "--meta",
            "note=a=b",
            "data.csv",
            "daily",
        ])
        .unwrap();

        let Ok(IngestMode::Commit(meta)) = cli.ingest_mode() else {
            panic!("expected commit mode");
        };
        assert_eq!(meta.message.as_deref(), Some("nightly"));
        assert_eq!(meta.date.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(meta.extra["owner"], "data-team");
        assert_eq!(meta.extra["note"], "a=b");
    }

    #[rstest]
    #[case(&["--meta", "novalue", "data.csv", "daily"])]
    #[case(&["--date", "yesterday", "data.csv", "daily"])]
    #[case(&["--meta", "date=yesterday", "data.csv", "daily"])]
    #[case(&["--meta", "message=hello", "data.csv", "daily"])]
    fn test_invalid_values(#[case] args: &[&str]) {
        assert_eq!(parse(args).unwrap_err().kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_var("STRATA_CONFIG", Some("/etc/strata.toml"), || {
            let cli = parse(&["data.csv", "daily"]).unwrap();
            assert_eq!(cli.config, Some(PathBuf::from("/etc/strata.toml")));
        });
    }

    #[test]
    fn test_reserved_meta_key_message() {
        let err = parse(&["--meta", "date=yesterday", "data.csv", "daily"]).unwrap_err();
        assert!(err.to_string().contains("`date` is reserved, use --date to set it"));
    }

    #[rstest]
    #[case(
        CommitOutcome::WrittenOnly(BlobHash::of(b"rows")),
        format!("#{}", BlobHash::of(b"rows"))
    )]
    #[case(
        CommitOutcome::SkippedUnchanged,
        String::from("Content unchanged since last fetch, no commit made")
    )]
    fn test_report_outcome(#[case] outcome: CommitOutcome, #[case] expected: String) {
        let line = report_outcome(&outcome, "local::daily", Duration::from_secs(1)).unwrap();
        assert_eq!(line, expected);
    }

    #[test]
    fn test_report_committed() {
        let hash = BlobHash::of(b"rows");
        let line = report_outcome(
            &CommitOutcome::Committed(hash),
            "local::daily",
            Duration::from_millis(1500),
        )
        .unwrap();
        assert!(line.ends_with(&format!(
            "Committed {hash} as the new head of 'local::daily' in 1.50s"
        )));
    }

    #[test]
    fn test_report_conflict_fails() {
        let err = report_outcome(
            &CommitOutcome::ConflictDetected,
            "local::daily",
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'local::daily' was updated while fetching"));
    }
}
