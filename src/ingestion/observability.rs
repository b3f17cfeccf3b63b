use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::error::LoadError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// The file was aborted; the run continues.
    Error,
    /// Infrastructure failure: store unavailable, invalid configuration or I/O.
    Critical,
}

impl IngestionSeverity {
    /// Severity of a failure that ended the processing of one file.
    pub fn for_error(e: &LoadError) -> Self {
        match e {
            LoadError::StoreUnavailable(_) | LoadError::Config { .. } | LoadError::Io(_) => {
                IngestionSeverity::Critical
            }
            LoadError::Format { .. }
            | LoadError::SchemaMissing { .. }
            | LoadError::SchemaMismatch { .. }
            | LoadError::Store(_)
            | LoadError::Pattern(_) => IngestionSeverity::Error,
        }
    }
}

/// Context about one file's ingestion.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// The input path.
    pub path: PathBuf,
    /// Target table.
    pub table: String,
}

/// Per-file counters, created when a file is opened and finalized at end of file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStats {
    pub path: PathBuf,
    /// All lines read, including skipped ones.
    pub total_lines: usize,
    /// Lines handed to the row decoder.
    pub data_lines: usize,
    /// Leading-skip, blank, header and comment lines.
    pub skipped_lines: usize,
    /// Data lines that could not be decoded.
    pub decode_errors: usize,
    /// Batches rejected by a constraint violation (one per batch, not per row).
    pub constraint_errors: usize,
    /// REAL fields that did not parse; their rows were still loaded.
    pub coercion_warnings: usize,
    pub batches: usize,
    pub commits: usize,
    /// Whether this file created the target table.
    pub table_created: bool,
    /// Time spent executing insert batches, and the longest single batch.
    pub batch_time: Duration,
    pub slowest_batch: Duration,
    pub elapsed: Duration,
}

impl IngestionStats {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Rows with a decode or constraint error.
    pub fn errors(&self) -> usize {
        self.decode_errors + self.constraint_errors
    }

    /// Data lines minus errors. Because constraint errors are counted per batch this is an
    /// upper bound when batches hold more than one row.
    pub fn rows_imported(&self) -> usize {
        self.data_lines.saturating_sub(self.errors())
    }
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called before a file is opened.
    fn on_start(&self, _ctx: &IngestionContext) {}

    /// Called when a file has been loaded to the end.
    fn on_success(&self, _ctx: &IngestionContext, _stats: &IngestionStats) {}

    /// Called when a file was aborted.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &LoadError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_start(&self, ctx: &IngestionContext) {
        for o in &self.observers {
            o.on_start(ctx);
        }
    }

    fn on_success(&self, ctx: &IngestionContext, stats: &IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports file outcomes as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_start(&self, ctx: &IngestionContext) {
        info!(path = %ctx.path.display(), table = %ctx.table, "processing");
    }

    fn on_success(&self, ctx: &IngestionContext, stats: &IngestionStats) {
        if stats.errors() > 0 {
            warn!(
                path = %ctx.path.display(),
                errors = stats.errors(),
                decode_errors = stats.decode_errors,
                failed_batches = stats.constraint_errors,
                "errors encountered, check result"
            );
        }
        info!(
            path = %ctx.path.display(),
            lines = stats.data_lines,
            imported = stats.rows_imported(),
            batch_s = stats.batch_time.as_secs_f64(),
            slowest_batch_s = stats.slowest_batch.as_secs_f64(),
            elapsed_s = stats.elapsed.as_secs_f64(),
            "file loaded"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        error!(path = %ctx.path.display(), ?severity, %error, "file aborted");
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        error!(path = %ctx.path.display(), ?severity, %error, "ALERT");
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Append one line to the log file.
    pub fn write(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_start(&self, ctx: &IngestionContext) {
        self.write(&format!(
            "{} start table={} path={}",
            unix_ts(),
            ctx.table,
            ctx.path.display()
        ));
    }

    fn on_success(&self, ctx: &IngestionContext, stats: &IngestionStats) {
        self.write(&format!(
            "{} ok table={} path={} lines={} imported={} errors={} batch_s={:.3} elapsed_s={:.3}",
            unix_ts(),
            ctx.table,
            ctx.path.display(),
            stats.data_lines,
            stats.rows_imported(),
            stats.errors(),
            stats.batch_time.as_secs_f64(),
            stats.elapsed.as_secs_f64()
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        self.write(&format!(
            "{} fail severity={:?} table={} path={} err={}",
            unix_ts(),
            severity,
            ctx.table,
            ctx.path.display(),
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoadError) {
        self.write(&format!(
            "{} ALERT severity={:?} table={} path={} err={}",
            unix_ts(),
            severity,
            ctx.table,
            ctx.path.display(),
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
