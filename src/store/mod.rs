//! Relational store access.
//!
//! The ingestion driver only talks to the store through [`TableStore`]: catalog probes, plain
//! statements, batched inserts and commits. [`SqliteStore`] is the `rusqlite` implementation.
//!
//! - [`schema`]: create-or-adopt table resolution
//! - [`loader`]: batched inserts with periodic commits

pub mod loader;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use tracing::debug;

use crate::config::LoadOptions;
use crate::error::{LoadError, LoadResult};
use crate::types::{TypedRow, Value};

pub use loader::{BatchLoader, LoaderStats};
pub use schema::{adopt_existing, create_statement, create_table, insert_statement, reconcile_spans};

/// One column as reported by the store's catalog, in storage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
}

/// Result of one batched insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Every row of the batch was executed.
    Inserted { rows: usize },
    /// A uniqueness or other constraint stopped the batch.
    ///
    /// Rows executed before the violating row stay in the open transaction; later rows of the
    /// batch are not attempted.
    ConstraintViolation { message: String },
}

/// Store capability consumed by schema resolution and batch loading.
pub trait TableStore {
    /// Whether a table named `table` exists.
    fn table_exists(&self, table: &str) -> LoadResult<bool>;

    /// Column catalog of an existing table, in storage order.
    fn table_columns(&self, table: &str) -> LoadResult<Vec<CatalogColumn>>;

    /// Execute a single statement without parameters.
    fn execute(&mut self, sql: &str) -> LoadResult<()>;

    /// Execute `sql` once per row, inside the current transaction.
    ///
    /// Constraint violations are reported as [`InsertOutcome::ConstraintViolation`]; any other
    /// failure is an error.
    fn insert_batch(&mut self, sql: &str, rows: &[TypedRow]) -> LoadResult<InsertOutcome>;

    /// Commit pending writes. A no-op when nothing is pending.
    fn commit(&mut self) -> LoadResult<()>;
}

/// SQLite-backed [`TableStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// Failures here are [`LoadError::StoreUnavailable`] and stop the whole run.
    pub fn open(path: impl AsRef<Path>, opts: &LoadOptions) -> LoadResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| LoadError::StoreUnavailable(format!("cannot open {}: {e}", path.display())))?;
        Self::configure(conn, opts)
    }

    /// A private in-memory database, mostly useful for tests.
    pub fn open_in_memory(opts: &LoadOptions) -> LoadResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LoadError::StoreUnavailable(format!("cannot open in-memory database: {e}")))?;
        Self::configure(conn, opts)
    }

    fn configure(conn: Connection, opts: &LoadOptions) -> LoadResult<Self> {
        conn.busy_timeout(Duration::from_millis(opts.busy_timeout_ms))
            .map_err(|e| LoadError::StoreUnavailable(e.to_string()))?;
        if opts.synchronous_off {
            conn.pragma_update(None, "synchronous", "OFF")
                .map_err(|e| LoadError::StoreUnavailable(e.to_string()))?;
        }
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of rows currently in `table`.
    pub fn count_rows(&self, table: &str) -> LoadResult<i64> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Commit pending writes and close the connection.
    pub fn close(mut self) -> LoadResult<()> {
        self.commit()?;
        self.conn.close().map_err(|(_, e)| LoadError::Store(e))
    }

    fn begin_if_needed(&mut self) -> LoadResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

impl TableStore for SqliteStore {
    fn table_exists(&self, table: &str) -> LoadResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |r| r.get(0),
            )
            .map_err(|e| LoadError::StoreUnavailable(format!("catalog probe for '{table}' failed: {e}")))?;
        Ok(count > 0)
    }

    fn table_columns(&self, table: &str) -> LoadResult<Vec<CatalogColumn>> {
        let probe_err = |e: rusqlite::Error| {
            LoadError::StoreUnavailable(format!("cannot read columns of '{table}': {e}"))
        };
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.conn.prepare(&sql).map_err(probe_err)?;
        let rows = stmt
            .query_map([], |r| {
                Ok(CatalogColumn {
                    name: r.get(1)?,
                    declared_type: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    not_null: r.get::<_, i64>(3)? != 0,
                })
            })
            .map_err(probe_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(probe_err)
    }

    fn execute(&mut self, sql: &str) -> LoadResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn insert_batch(&mut self, sql: &str, rows: &[TypedRow]) -> LoadResult<InsertOutcome> {
        self.begin_if_needed()?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        for row in rows {
            match stmt.execute(params_from_iter(row.values())) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, msg)) if err.code == ErrorCode::ConstraintViolation => {
                    return Ok(InsertOutcome::ConstraintViolation {
                        message: msg.unwrap_or_else(|| err.to_string()),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(InsertOutcome::Inserted { rows: rows.len() })
    }

    fn commit(&mut self) -> LoadResult<()> {
        if !self.conn.is_autocommit() {
            debug!("commit");
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, SqlType, TableSchema};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(&LoadOptions::default()).unwrap()
    }

    #[test]
    fn probes_catalog() {
        let mut s = store();
        assert!(!s.table_exists("stars").unwrap());
        s.execute("CREATE TABLE stars (UID INTEGER PRIMARY KEY, name TEXT NOT NULL, mag REAL)")
            .unwrap();
        assert!(s.table_exists("stars").unwrap());
        let cols = s.table_columns("stars").unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["UID", "name", "mag"]);
        assert_eq!(cols[2].declared_type, "REAL");
        assert!(cols[1].not_null);
        assert!(!cols[2].not_null);
    }

    #[test]
    fn constraint_violation_is_an_outcome_not_an_error() {
        let mut s = store();
        s.execute("CREATE TABLE t (UID INTEGER PRIMARY KEY AUTOINCREMENT, k INTEGER UNIQUE NOT NULL)")
            .unwrap();
        let schema = TableSchema::new("t", vec![ColumnSpec::new("k", SqlType::Integer).unique()]);
        let rows = vec![
            schema.row(vec![Value::Integer(1)]).unwrap(),
            schema.row(vec![Value::Integer(1)]).unwrap(),
            schema.row(vec![Value::Integer(2)]).unwrap(),
        ];
        let out = s.insert_batch("INSERT OR ABORT INTO t (k) VALUES (?)", &rows).unwrap();
        assert!(matches!(out, InsertOutcome::ConstraintViolation { .. }));
        s.commit().unwrap();
        // The first row went in before the violation; the third was never attempted.
        assert_eq!(s.count_rows("t").unwrap(), 1);
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
