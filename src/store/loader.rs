//! Batched inserts with periodic commits.
//!
//! Rows are buffered until `batch_size` of them are pending, then inserted with one prepared
//! statement. Independently, the transaction is committed every `commit_every` rows. A batch
//! that hits a constraint violation counts as one error for the whole batch and loading goes on.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::LoadOptions;
use crate::error::LoadResult;
use crate::types::{TableSchema, TypedRow};

use super::schema::insert_statement;
use super::{InsertOutcome, TableStore};

/// Counters collected by a [`BatchLoader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Rows handed to the loader.
    pub rows_submitted: usize,
    /// Batched insert attempts.
    pub batches: usize,
    /// Batches stopped by a constraint violation.
    pub failed_batches: usize,
    pub commits: usize,
    /// Time spent between consecutive batch flushes.
    pub slowest_batch: Duration,
    pub batch_time: Duration,
}

/// Buffers decoded rows and writes them to a [`TableStore`] in batches.
///
/// The insert template is generated once from the schema, so its column order is the one the
/// rows were decoded against.
pub struct BatchLoader<'s, S: TableStore + ?Sized> {
    store: &'s mut S,
    insert_sql: String,
    batch_size: usize,
    commit_every: usize,
    buffer: Vec<TypedRow>,
    since_commit: usize,
    batch_started: Instant,
    stats: LoaderStats,
}

impl<'s, S: TableStore + ?Sized> BatchLoader<'s, S> {
    pub fn new(store: &'s mut S, schema: &TableSchema, opts: &LoadOptions) -> Self {
        let batch_size = opts.batch_size.max(1);
        Self {
            store,
            insert_sql: insert_statement(schema, opts.conflict),
            batch_size,
            commit_every: opts.commit_every.max(1),
            buffer: Vec::with_capacity(batch_size.min(65_536)),
            since_commit: 0,
            batch_started: Instant::now(),
            stats: LoaderStats::default(),
        }
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    /// Number of buffered rows not yet inserted.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one row, flushing and committing at the configured thresholds.
    pub fn push(&mut self, row: TypedRow) -> LoadResult<()> {
        self.buffer.push(row);
        self.stats.rows_submitted += 1;
        self.since_commit += 1;

        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        if self.since_commit >= self.commit_every {
            self.store.commit()?;
            self.stats.commits += 1;
            self.since_commit = 0;
        }
        Ok(())
    }

    /// Insert all buffered rows as one batch.
    pub fn flush(&mut self) -> LoadResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let outcome = self.store.insert_batch(&self.insert_sql, &self.buffer)?;
        self.stats.batches += 1;
        if let InsertOutcome::ConstraintViolation { message } = outcome {
            self.stats.failed_batches += 1;
            if self.buffer.len() == 1 {
                warn!(row = ?self.buffer[0].values(), %message, "row rejected");
            } else {
                warn!(rows = self.buffer.len(), %message, "batch stopped by constraint violation");
            }
        }

        let elapsed = self.batch_started.elapsed();
        self.stats.batch_time += elapsed;
        self.stats.slowest_batch = self.stats.slowest_batch.max(elapsed);
        debug!(
            rows = self.stats.rows_submitted,
            batch = self.stats.batches,
            elapsed_s = elapsed.as_secs_f64(),
            "batch flushed"
        );
        self.batch_started = Instant::now();
        self.buffer.clear();
        Ok(())
    }

    /// Flush the remaining rows and commit, even when no commit boundary was reached.
    pub fn finish(mut self) -> LoadResult<LoaderStats> {
        self.flush()?;
        self.store.commit()?;
        self.stats.commits += 1;
        Ok(self.stats)
    }
}
