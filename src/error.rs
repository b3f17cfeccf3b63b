use thiserror::Error;

/// Convenience result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Error type returned by the format parser, schema resolver and ingestion driver.
///
/// Variants that abort only the current file are distinguished from those that abort the
/// whole run by [`LoadError::is_fatal_for_run`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// Underlying I/O error (e.g. input file not found).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The column-name or format declaration could not be parsed.
    #[error("format error at line {line}: {message}")]
    Format { line: usize, message: String },

    /// A data line was reached before column names and formats were known.
    #[error("no schema available at line {line}: {message}")]
    SchemaMissing { line: usize, message: String },

    /// The adopted table and the file's declarations disagree in shape.
    #[error("schema mismatch for table '{table}': {message}")]
    SchemaMismatch { table: String, message: String },

    /// The store could not be opened or its catalog could not be probed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other store failure (e.g. the CREATE statement was rejected).
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Invalid options or configuration file.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// An input glob pattern could not be parsed.
    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl LoadError {
    /// Returns `true` if this error must stop the whole run rather than just the current file.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, LoadError::StoreUnavailable(_) | LoadError::Config { .. })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        LoadError::Config {
            message: message.into(),
        }
    }
}

/// A data line that could not be turned into a [`crate::types::TypedRow`].
///
/// These are recoverable: the driver counts the row as an error and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The line split into a different number of fields than the schema has columns.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// An INTEGER column held a value that is neither NULL nor an integer.
    #[error("field {index}: cannot parse '{raw}' as integer")]
    Integer { index: usize, raw: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_fatal_classification() {
        assert!(LoadError::StoreUnavailable("locked".into()).is_fatal_for_run());
        assert!(LoadError::config("batch_size must be >= 1").is_fatal_for_run());
        assert!(
            !LoadError::SchemaMissing {
                line: 3,
                message: "no column names".into()
            }
            .is_fatal_for_run()
        );
        assert!(
            !LoadError::Format {
                line: 2,
                message: "bad token".into()
            }
            .is_fatal_for_run()
        );
    }

    #[test]
    fn decode_error_messages_name_the_field() {
        let e = DecodeError::Integer {
            index: 2,
            raw: "x1".into(),
        };
        assert_eq!(e.to_string(), "field 2: cannot parse 'x1' as integer");
    }
}
