//! Text-file ingestion.
//!
//! Most callers should use [`IngestionRun`] (from [`driver`]) which:
//!
//! - expands the input list (see [`resolve_inputs`])
//! - loads each file into one SQLite table, creating it from the file's header lines if needed
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! The building blocks are also available under:
//! - [`format`]: column-name and format-line parsing
//! - [`decode`]: data line → typed row
//! - [`driver`]: per-file state machine ([`ingest_reader`], [`ingest_file`])

pub mod decode;
pub mod driver;
pub mod format;
pub mod observability;

pub use decode::{DecodedRow, FieldCoercion, RowDecoder, coerce_field};
pub use driver::{
    FailedFile, IngestionRun, RunSummary, ingest_file, ingest_reader, resolve_inputs,
};
pub use format::{FormatToken, build_columns, parse_column_names, parse_descriptors, parse_formats};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
