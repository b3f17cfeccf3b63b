//! Core data model: column specifications, table schemas and typed row values.
//!
//! Every [`TableSchema`] starts with the synthetic identifier column ([`IDENTIFIER_COLUMN`]);
//! decoded rows ([`TypedRow`]) are aligned with the columns that follow it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Name of the auto-incrementing identifier column added to every table.
pub const IDENTIFIER_COLUMN: &str = "UID";

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point number.
    Real,
    /// UTF-8 text.
    Text,
}

impl SqlType {
    /// SQL keyword used in `CREATE TABLE`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }

    /// Map a declared column type read back from the catalog.
    ///
    /// Uses SQLite's affinity rules; anything that is neither integer nor floating point is
    /// treated as text.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            SqlType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            SqlType::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            SqlType::Real
        } else {
            SqlType::Text
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How data lines are split into fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Split on a separator (default: runs of whitespace).
    #[default]
    Delimited,
    /// Slice each line at fixed byte offsets.
    FixedWidth,
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
    /// Half-open byte range `[start, end)` of the column in fixed-width mode.
    pub fixed_span: Option<(usize, usize)>,
}

impl ColumnSpec {
    /// A nullable, non-unique column without a fixed-width span.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            unique: false,
            fixed_span: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// UNIQUE implies NOT NULL.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.nullable = false;
        self
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.fixed_span = Some((start, end));
        self
    }

    /// Constraint clause used in `CREATE TABLE` (may be empty).
    pub fn constraint_sql(&self) -> &'static str {
        if self.unique {
            "UNIQUE NOT NULL"
        } else if !self.nullable {
            "NOT NULL"
        } else {
            ""
        }
    }

    fn identifier() -> Self {
        Self {
            name: IDENTIFIER_COLUMN.to_string(),
            sql_type: SqlType::Integer,
            nullable: false,
            unique: true,
            fixed_span: None,
        }
    }
}

/// Ordered columns of one table, identifier column first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Build a schema from the data columns; the identifier column is prepended.
    pub fn new(table: impl Into<String>, data_columns: Vec<ColumnSpec>) -> Self {
        let mut columns = Vec::with_capacity(data_columns.len() + 1);
        columns.push(ColumnSpec::identifier());
        columns.extend(data_columns);
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Build a schema from catalog columns read in storage order.
    ///
    /// The first catalog column is taken as the identifier and is kept as-is.
    pub(crate) fn from_catalog(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// All columns including the identifier.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Columns that receive values from the input file (everything but the identifier).
    pub fn data_columns(&self) -> &[ColumnSpec] {
        self.columns.get(1..).unwrap_or(&[])
    }

    pub fn data_column_count(&self) -> usize {
        self.data_columns().len()
    }

    /// Replace the fixed-width spans of the data columns, keeping names and types.
    pub(crate) fn set_spans(&mut self, spans: &[(usize, usize)]) {
        for (column, span) in self.columns.iter_mut().skip(1).zip(spans) {
            column.fixed_span = Some(*span);
        }
    }

    /// Check `values` against the column count and wrap them as a row.
    pub fn row(&self, values: Vec<Value>) -> Result<TypedRow, DecodeError> {
        let expected = self.data_column_count();
        if values.len() != expected {
            return Err(DecodeError::FieldCount {
                expected,
                found: values.len(),
            });
        }
        Ok(TypedRow(values))
    }
}

/// A single typed value in a [`TypedRow`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Values of one data line, positionally aligned with [`TableSchema::data_columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow(Vec<Value>);

impl TypedRow {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
