//! Per-file ingestion and multi-file runs.
//!
//! Each file goes through `AwaitingHeader → SchemaReady → Streaming → Done`:
//!
//! - while awaiting the header, the column-name and format lines (at their configured line
//!   numbers) are parsed; once both are known a missing table is created. An existing table is
//!   adopted before the first line is read, and in delimited mode the file's header lines are
//!   then only comments.
//! - header lines start with the comment marker. The column-name line may omit it, but is then
//!   only taken as a header if the marked format line follows; otherwise it is data.
//! - the first data line builds the decoder and the insert template; every data line after it
//!   is decoded and handed to the [`BatchLoader`].
//! - at end of file the loader flushes and commits.
//!
//! A data line seen before the schema is known aborts the file.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::LoadOptions;
use crate::error::{LoadError, LoadResult};
use crate::store::{BatchLoader, SqliteStore, TableStore, adopt_existing, create_table, reconcile_spans};
use crate::types::{ParseMode, TableSchema};

use super::decode::RowDecoder;
use super::format::{FormatToken, build_columns, parse_column_names, parse_formats};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};

/// Processing state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    AwaitingHeader,
    SchemaReady,
    Streaming,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Skip,
    /// Header or comment line; the text after the marker starts at `body_start`.
    Header { body_start: usize },
    Data,
}

/// Header detection and schema resolution state for one file.
struct HeaderScan<'o> {
    opts: &'o LoadOptions,
    table: String,
    schema: Option<TableSchema>,
    adopted: bool,
    names: Option<Vec<String>>,
    formats: Option<Vec<FormatToken>>,
    state: DriverState,
    table_created: bool,
}

impl<'o> HeaderScan<'o> {
    fn new<S: TableStore + ?Sized>(store: &S, opts: &'o LoadOptions, table: &str) -> LoadResult<Self> {
        let schema = adopt_existing(store, table)?;
        let adopted = schema.is_some();
        // Fixed-width spans always come from the file, even for an existing table.
        let state = if adopted && opts.mode == ParseMode::Delimited {
            DriverState::SchemaReady
        } else {
            DriverState::AwaitingHeader
        };
        Ok(Self {
            opts,
            table: table.to_string(),
            schema,
            adopted,
            names: None,
            formats: None,
            state,
            table_created: false,
        })
    }

    fn wants_names(&self, line_no: usize) -> bool {
        self.state == DriverState::AwaitingHeader
            && !self.adopted
            && self.names.is_none()
            && line_no == self.opts.column_line
    }

    fn wants_formats(&self, line_no: usize) -> bool {
        self.state == DriverState::AwaitingHeader && self.formats.is_none() && line_no == self.opts.format_line
    }

    fn classify(&self, line_no: usize, line: &str) -> LineKind {
        if line_no <= self.opts.skip_lines || line.trim().is_empty() {
            return LineKind::Skip;
        }
        if line.starts_with(self.opts.comment_marker) {
            return LineKind::Header {
                body_start: self.opts.comment_marker.len_utf8(),
            };
        }
        LineKind::Data
    }

    /// Whether an unmarked line may be the column-name line, pending the format line.
    fn may_hold_names(&self, line_no: usize) -> bool {
        line_no == self.opts.column_line && self.opts.column_line < self.opts.format_line && self.names.is_none()
    }

    /// Take a held unmarked line as the column names. An adopted table keeps its own names.
    fn accept_unmarked_names(&mut self, line_no: usize, line: &str) -> LoadResult<()> {
        if !self.adopted && self.state == DriverState::AwaitingHeader {
            self.names = Some(parse_column_names(line, self.opts, line_no)?);
        }
        Ok(())
    }

    fn accept_header<S: TableStore + ?Sized>(&mut self, store: &mut S, line_no: usize, body: &str) -> LoadResult<()> {
        let wants_names = self.wants_names(line_no);
        let wants_formats = self.wants_formats(line_no);
        if wants_names {
            self.names = Some(parse_column_names(body, self.opts, line_no)?);
        }
        if wants_formats {
            self.formats = Some(parse_formats(body, self.opts, line_no)?);
        }
        if wants_names || wants_formats {
            self.try_resolve(store, line_no)?;
        }
        Ok(())
    }

    fn try_resolve<S: TableStore + ?Sized>(&mut self, store: &mut S, line_no: usize) -> LoadResult<()> {
        if let Some(schema) = self.schema.as_mut() {
            if let Some(formats) = &self.formats {
                reconcile_spans(schema, formats)?;
                self.set_state(DriverState::SchemaReady);
            }
        } else if let (Some(names), Some(formats)) = (&self.names, &self.formats) {
            let columns = build_columns(names, formats, line_no)?;
            self.schema = Some(create_table(store, &self.table, columns)?);
            self.table_created = true;
            self.set_state(DriverState::SchemaReady);
        }
        Ok(())
    }

    fn missing(&self) -> String {
        let mut missing = Vec::new();
        if !self.adopted && self.names.is_none() {
            missing.push(format!("column names (expected on line {})", self.opts.column_line));
        }
        if self.formats.is_none() {
            missing.push(format!("format description (expected on line {})", self.opts.format_line));
        }
        format!("missing {}", missing.join(" and "))
    }

    fn set_state(&mut self, state: DriverState) {
        debug!(table = %self.table, from = ?self.state, to = ?state, "state change");
        self.state = state;
    }
}

/// Ingest one file into `table`.
pub fn ingest_file<S: TableStore + ?Sized>(
    store: &mut S,
    path: impl AsRef<Path>,
    table: &str,
    opts: &LoadOptions,
) -> LoadResult<IngestionStats> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    ingest_reader(store, reader, path, table, opts)
}

/// Ingest text from `reader`; `source` is only used for reporting.
pub fn ingest_reader<S: TableStore + ?Sized, R: BufRead>(
    store: &mut S,
    mut reader: R,
    source: impl AsRef<Path>,
    table: &str,
    opts: &LoadOptions,
) -> LoadResult<IngestionStats> {
    let started = Instant::now();
    let mut stats = IngestionStats::new(source.as_ref());
    let mut header = HeaderScan::new(store, opts, table)?;
    let mut buf = Vec::new();

    // An unmarked line at the column-name position, waiting for the format line to decide.
    let mut held: Option<(usize, String)> = None;
    let mut backlog: Vec<(usize, String)> = Vec::new();
    while let Some(line) = next_line(&mut reader, &mut buf)? {
        stats.total_lines += 1;
        let line_no = stats.total_lines;
        match header.classify(line_no, &line) {
            LineKind::Skip => stats.skipped_lines += 1,
            LineKind::Header { body_start } => {
                stats.skipped_lines += 1;
                if line_no == opts.format_line {
                    if let Some((held_no, held_line)) = held.take() {
                        stats.skipped_lines += 1;
                        header.accept_unmarked_names(held_no, &held_line)?;
                    }
                }
                header.accept_header(store, line_no, &line[body_start..])?;
            }
            LineKind::Data if held.is_none() && header.may_hold_names(line_no) => {
                held = Some((line_no, line));
            }
            LineKind::Data => {
                backlog.extend(held.take());
                backlog.push((line_no, line));
                break;
            }
        }
    }
    backlog.extend(held.take());
    stats.table_created = header.table_created;

    let Some(&(first_no, _)) = backlog.first() else {
        header.set_state(DriverState::Done);
        stats.elapsed = started.elapsed();
        return Ok(stats);
    };

    let schema = match header.schema.take() {
        Some(schema) if header.state == DriverState::SchemaReady => schema,
        _ => {
            return Err(LoadError::SchemaMissing {
                line: first_no,
                message: header.missing(),
            });
        }
    };

    header.set_state(DriverState::Streaming);
    let decoder = RowDecoder::new(&schema, opts)?;
    let mut loader = BatchLoader::new(store, &schema, opts);
    debug!(sql = loader.insert_sql(), "insert template");

    for (line_no, line) in &backlog {
        load_line(&decoder, &mut loader, &mut stats, *line_no, line)?;
    }
    while let Some(line) = next_line(&mut reader, &mut buf)? {
        stats.total_lines += 1;
        let line_no = stats.total_lines;
        match header.classify(line_no, &line) {
            LineKind::Data => load_line(&decoder, &mut loader, &mut stats, line_no, &line)?,
            LineKind::Skip | LineKind::Header { .. } => stats.skipped_lines += 1,
        }
    }

    let loaded = loader.finish()?;
    header.set_state(DriverState::Done);
    stats.constraint_errors = loaded.failed_batches;
    stats.batches = loaded.batches;
    stats.commits = loaded.commits;
    stats.batch_time = loaded.batch_time;
    stats.slowest_batch = loaded.slowest_batch;
    stats.elapsed = started.elapsed();
    Ok(stats)
}

fn load_line<S: TableStore + ?Sized>(
    decoder: &RowDecoder<'_>,
    loader: &mut BatchLoader<'_, S>,
    stats: &mut IngestionStats,
    line_no: usize,
    line: &str,
) -> LoadResult<()> {
    stats.data_lines += 1;
    match decoder.decode(line) {
        Ok(decoded) => {
            stats.coercion_warnings += decoded.coercions.len();
            loader.push(decoded.row)
        }
        Err(e) => {
            stats.decode_errors += 1;
            warn!(line = line_no, error = %e, "line not loaded");
            Ok(())
        }
    }
}

/// Read one line without its terminator. Invalid UTF-8 is replaced rather than rejected.
fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Expand input arguments. Glob patterns are expanded in sorted order; a pattern that matches
/// nothing is kept as a literal path so that opening it reports the error.
pub fn resolve_inputs<I, P>(patterns: I) -> LoadResult<Vec<PathBuf>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut out = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched = glob::glob(pattern)?
            .collect::<Result<Vec<PathBuf>, glob::GlobError>>()
            .map_err(|e| LoadError::Io(e.into()))?;
        if matched.is_empty() {
            out.push(PathBuf::from(pattern));
        } else {
            matched.sort();
            out.extend(matched);
        }
    }
    Ok(out)
}

/// A file that was aborted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`IngestionRun::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Stats of every file loaded to the end, in input order.
    pub files: Vec<IngestionStats>,
    pub failed: Vec<FailedFile>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn files_attempted(&self) -> usize {
        self.files.len() + self.failed.len()
    }

    pub fn total_errors(&self) -> usize {
        self.files.iter().map(IngestionStats::errors).sum()
    }

    pub fn rows_imported(&self) -> usize {
        self.files.iter().map(IngestionStats::rows_imported).sum()
    }

    /// Mean wall time per attempted file.
    pub fn seconds_per_file(&self) -> f64 {
        match self.files_attempted() {
            0 => 0.0,
            n => self.elapsed.as_secs_f64() / n as f64,
        }
    }
}

/// Loads a list of files into one SQLite database, one file at a time.
///
/// The connection is opened per file and closed, with a final commit, before the next file.
/// File-level failures are reported to the observer and the run moves on; store and
/// configuration failures stop the run.
#[derive(Clone)]
pub struct IngestionRun {
    pub db_path: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub options: LoadOptions,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionRun")
            .field("db_path", &self.db_path)
            .field("inputs", &self.inputs.len())
            .field("options", &self.options)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl IngestionRun {
    pub fn new(db_path: impl Into<PathBuf>, inputs: Vec<PathBuf>, options: LoadOptions) -> Self {
        Self {
            db_path: db_path.into(),
            inputs,
            options,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Target table of this run.
    pub fn table(&self) -> String {
        self.options.table_for(&self.db_path)
    }

    pub fn run(&self) -> LoadResult<RunSummary> {
        self.options.validate()?;
        let table = self.table();
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for path in &self.inputs {
            let ctx = IngestionContext {
                path: path.clone(),
                table: table.clone(),
            };
            if let Some(obs) = &self.observer {
                obs.on_start(&ctx);
            }

            let result = SqliteStore::open(&self.db_path, &self.options).and_then(|mut store| {
                let stats = ingest_file(&mut store, path, &table, &self.options)?;
                store.close()?;
                Ok(stats)
            });

            match result {
                Ok(stats) => {
                    if let Some(obs) = &self.observer {
                        obs.on_success(&ctx, &stats);
                    }
                    summary.files.push(stats);
                }
                Err(e) => {
                    let severity = IngestionSeverity::for_error(&e);
                    if let Some(obs) = &self.observer {
                        obs.on_failure(&ctx, severity, &e);
                        if severity >= self.alert_at_or_above {
                            obs.on_alert(&ctx, severity, &e);
                        }
                    }
                    if e.is_fatal_for_run() {
                        return Err(e);
                    }
                    summary.failed.push(FailedFile {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            files = summary.files.len(),
            failed = summary.failed.len(),
            elapsed_s = summary.elapsed.as_secs_f64(),
            per_file_s = summary.seconds_per_file(),
            "run finished"
        );
        Ok(summary)
    }
}
