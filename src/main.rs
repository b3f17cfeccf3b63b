use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use txt2sqlite::config::{LoadOptions, Separator, load_file_list, load_ignore_list};
use txt2sqlite::ingestion::{
    CompositeObserver, FileObserver, IngestionObserver, IngestionRun, RunSummary, TracingObserver, resolve_inputs,
};
use txt2sqlite::types::ParseMode;

/// Load text tables into a SQLite database.
///
/// Column names and formats are read from the first lines of each file (by default lines 1
/// and 2, marked with '#'). The table is created by the first file and appended to by the rest.
#[derive(Parser, Debug)]
#[command(name = "txt2sqlite", version)]
struct Args {
    /// SQLite database file (created if missing)
    db: PathBuf,

    /// Input files or glob patterns
    inputs: Vec<String>,

    /// Line number of the column names
    #[arg(short = 'c', long = "column-line")]
    column_line: Option<usize>,

    /// Line number of the format description
    #[arg(short = 'f', long = "format-line")]
    format_line: Option<usize>,

    /// String that denotes a NULL value
    #[arg(short = 'n', long = "null")]
    null: Option<String>,

    /// Field separator (default: runs of whitespace)
    #[arg(short = 's', long = "sep")]
    separator: Option<String>,

    /// Table name (default: database file name up to the first '.')
    #[arg(short = 't', long)]
    table: Option<String>,

    /// Rows per batched insert
    #[arg(long = "block")]
    batch_size: Option<usize>,

    /// Rows between commits
    #[arg(long = "commit")]
    commit_every: Option<usize>,

    /// Fixed-width columns; format tokens carry a width, e.g. s10 i4 f8
    #[arg(long = "fix")]
    fixed_width: bool,

    /// File listing input paths, one per line
    #[arg(long)]
    ifnames: Option<PathBuf>,

    /// File of 1-based column numbers to ignore
    #[arg(long)]
    ignore: Option<PathBuf>,

    /// Append per-file results to this log file
    #[arg(long)]
    lfname: Option<PathBuf>,

    /// Conflict clause for inserts: abort, fail, ignore, replace or rollback
    #[arg(long = "or")]
    conflict: Option<String>,

    /// Number of leading lines to skip in every file
    #[arg(long)]
    skip: Option<usize>,

    /// JSON file with load options; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Busy timeout in milliseconds
    #[arg(long = "timeout")]
    busy_timeout_ms: Option<u64>,

    /// Quiet mode - only warnings and the run summary
    #[arg(short, long)]
    quiet: bool,

    /// More logging (-v for per-batch events)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.quiet, args.verbose);

    let options = build_options(&args)?;

    let mut patterns = args.inputs.clone();
    if let Some(list) = &args.ifnames {
        let listed = load_file_list(list).with_context(|| format!("reading file list {}", list.display()))?;
        patterns.extend(listed);
    }
    if patterns.is_empty() {
        anyhow::bail!("no input files given (pass paths or --ifnames)");
    }
    let inputs = resolve_inputs(&patterns)?;

    let mut observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(TracingObserver)];
    if let Some(path) = &args.lfname {
        observers.push(Arc::new(FileObserver::new(path)));
    }

    let run = IngestionRun::new(&args.db, inputs, options)
        .with_observer(Arc::new(CompositeObserver::new(observers)));
    let summary = run
        .run()
        .with_context(|| format!("loading into {} (table '{}')", args.db.display(), run.table()))?;

    print_summary(&summary, args.quiet);
    Ok(if summary.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(quiet: bool, verbose: u8) {
    let default = match (quiet, verbose) {
        (true, _) => "txt2sqlite=warn",
        (false, 0) => "txt2sqlite=info",
        (false, _) => "txt2sqlite=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_options(args: &Args) -> anyhow::Result<LoadOptions> {
    let mut opts = match &args.config {
        Some(path) => LoadOptions::from_json_file(path)?,
        None => LoadOptions::default(),
    };

    if let Some(v) = args.column_line {
        opts.column_line = v;
    }
    if let Some(v) = args.format_line {
        opts.format_line = v;
    }
    if let Some(v) = &args.null {
        opts.null_sentinel = v.clone();
    }
    if let Some(v) = &args.separator {
        opts.separator = Separator::Literal(v.clone());
    }
    if let Some(v) = &args.table {
        opts.table = Some(v.clone());
    }
    if let Some(v) = args.batch_size {
        opts.batch_size = v;
    }
    if let Some(v) = args.commit_every {
        opts.commit_every = v;
    }
    if args.fixed_width {
        opts.mode = ParseMode::FixedWidth;
    }
    if let Some(v) = &args.conflict {
        opts.conflict = v.parse()?;
    }
    if let Some(v) = args.skip {
        opts.skip_lines = v;
    }
    if let Some(v) = args.busy_timeout_ms {
        opts.busy_timeout_ms = v;
    }
    if let Some(path) = &args.ignore {
        opts.ignore_columns =
            load_ignore_list(path).with_context(|| format!("reading ignore list {}", path.display()))?;
    }

    opts.validate()?;
    Ok(opts)
}

fn print_summary(summary: &RunSummary, quiet: bool) {
    if !quiet {
        for stats in &summary.files {
            println!(
                "{}: {} lines, {} imported, {} errors, {:.3} s",
                stats.path.display(),
                stats.data_lines,
                stats.rows_imported(),
                stats.errors(),
                stats.elapsed.as_secs_f64()
            );
        }
    }
    for failed in &summary.failed {
        eprintln!("{}: aborted: {}", failed.path.display(), failed.error);
    }
    println!(
        "{} files in {:.3} seconds = {:.3} seconds / file",
        summary.files_attempted(),
        summary.elapsed.as_secs_f64(),
        summary.seconds_per_file()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use txt2sqlite::config::ConflictPolicy;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "txt2sqlite", "stars.db", "a.txt", "-s", ",", "--block", "1", "--fix", "--or", "ignore", "-c", "3", "-f",
            "4",
        ]);
        let opts = build_options(&args).unwrap();
        assert_eq!(opts.separator, Separator::Literal(",".into()));
        assert_eq!(opts.batch_size, 1);
        assert_eq!(opts.mode, ParseMode::FixedWidth);
        assert_eq!(opts.conflict, ConflictPolicy::Ignore);
        assert_eq!((opts.column_line, opts.format_line), (3, 4));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = Args::parse_from(["txt2sqlite", "stars.db", "a.txt", "--commit", "0"]);
        assert!(build_options(&args).is_err());
        let args = Args::parse_from(["txt2sqlite", "stars.db", "a.txt", "--or", "sometimes"]);
        assert!(build_options(&args).is_err());
    }
}
