//! `txt2sqlite` loads whitespace- or separator-delimited (or fixed-width) text files into a
//! SQLite table.
//!
//! Each file describes its own columns in two header lines: the column names and a format line
//! with one type token per column. The first file creates the table; later files are appended
//! to it using the table's existing columns.
//!
//! ```text
//! # last   middle    first    age     income
//! #  sn      s         s       i        f
//! Doe      Jane      E.       44      1523.22
//! Smith    null      John     38      null
//! ```
//!
//! Every table gets an auto-incrementing `UID INTEGER PRIMARY KEY` ahead of the declared
//! columns.
//!
//! ## Format tokens
//!
//! - delimited mode: first character `i`/`l` → INTEGER, `f`/`d` → REAL, anything else → TEXT.
//!   A `u` marks the column `UNIQUE NOT NULL`; otherwise an `n` marks it `NOT NULL`.
//! - fixed-width mode: `<type><width>` (e.g. `s10`, `f8`); columns are consecutive byte spans
//!   starting at offset 0.
//!
//! The NULL sentinel (`null` by default) and blank fields map to [`types::Value::Null`] for
//! every column type.
//!
//! ## Quick example: load files
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use txt2sqlite::config::LoadOptions;
//! use txt2sqlite::ingestion::{IngestionRun, TracingObserver, resolve_inputs};
//!
//! # fn main() -> Result<(), txt2sqlite::LoadError> {
//! let inputs = resolve_inputs(["data/*.txt"])?;
//! let summary = IngestionRun::new("people.db", inputs, LoadOptions::default())
//!     .with_observer(Arc::new(TracingObserver))
//!     .run()?;
//! println!("files={} rows={}", summary.files.len(), summary.rows_imported());
//! # Ok(())
//! # }
//! ```
//!
//! Single files can be loaded against any [`store::TableStore`]:
//!
//! ```rust
//! use txt2sqlite::config::LoadOptions;
//! use txt2sqlite::ingestion::ingest_reader;
//! use txt2sqlite::store::SqliteStore;
//!
//! let opts = LoadOptions::default();
//! let mut store = SqliteStore::open_in_memory(&opts).unwrap();
//! let text = "# name mag\n# s f\nVega 0.03\nDeneb 1.25\n";
//! let stats = ingest_reader(&mut store, text.as_bytes(), "stars.txt", "stars", &opts).unwrap();
//! assert_eq!(stats.rows_imported(), 2);
//! assert_eq!(store.count_rows("stars").unwrap(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: header parsing, row decoding and the per-file driver
//! - [`store`]: SQLite access, table creation/adoption and batched loading
//! - [`config`]: load options
//! - [`types`]: column and value types
//! - [`error`]: error types used across the crate

pub mod config;
pub mod error;
pub mod ingestion;
pub mod store;
pub mod types;

pub use error::{DecodeError, LoadError, LoadResult};
