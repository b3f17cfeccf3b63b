//! Row decoding: one text line in, one [`TypedRow`] out.

use std::borrow::Cow;

use tracing::warn;

use crate::config::LoadOptions;
use crate::error::{DecodeError, LoadError, LoadResult};
use crate::types::{ParseMode, SqlType, TableSchema, TypedRow, Value};

/// A REAL field that did not parse. The raw text is kept in the row and the row is still loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCoercion {
    /// Zero-based data column index.
    pub index: usize,
    pub raw: String,
}

/// Output of [`RowDecoder::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    pub row: TypedRow,
    pub coercions: Vec<FieldCoercion>,
}

/// Decodes data lines against one schema.
///
/// Construction fails in fixed-width mode if any data column lacks a span, so decoding never
/// starts with a partial schema.
#[derive(Debug)]
pub struct RowDecoder<'a> {
    schema: &'a TableSchema,
    opts: &'a LoadOptions,
    spans: Vec<(usize, usize)>,
}

impl<'a> RowDecoder<'a> {
    pub fn new(schema: &'a TableSchema, opts: &'a LoadOptions) -> LoadResult<Self> {
        let spans = match opts.mode {
            ParseMode::Delimited => Vec::new(),
            ParseMode::FixedWidth => schema
                .data_columns()
                .iter()
                .map(|c| {
                    c.fixed_span.ok_or_else(|| LoadError::SchemaMismatch {
                        table: schema.table.clone(),
                        message: format!("column '{}' has no fixed-width span", c.name),
                    })
                })
                .collect::<LoadResult<Vec<_>>>()?,
        };
        Ok(Self { schema, opts, spans })
    }

    pub fn schema(&self) -> &TableSchema {
        self.schema
    }

    /// Split `line` into raw fields, before NULL handling and type coercion.
    ///
    /// In fixed-width mode a blank slice is replaced by the null sentinel.
    pub fn raw_fields<'l>(&self, line: &'l str) -> Vec<Cow<'l, str>> {
        match self.opts.mode {
            ParseMode::Delimited => self
                .opts
                .retained_fields(line)
                .into_iter()
                .map(Cow::Borrowed)
                .collect(),
            ParseMode::FixedWidth => self
                .spans
                .iter()
                .map(|&(start, end)| {
                    let slice = byte_slice(line, start, end);
                    if slice.trim().is_empty() {
                        Cow::Owned(self.opts.null_sentinel.clone())
                    } else {
                        slice
                    }
                })
                .collect(),
        }
    }

    pub fn decode(&self, line: &str) -> Result<DecodedRow, DecodeError> {
        let raw = self.raw_fields(line);
        let columns = self.schema.data_columns();
        if raw.len() != columns.len() {
            return Err(DecodeError::FieldCount {
                expected: columns.len(),
                found: raw.len(),
            });
        }

        let mut values = Vec::with_capacity(raw.len());
        let mut coercions = Vec::new();
        for (index, (field, column)) in raw.iter().zip(columns).enumerate() {
            let (value, coercion) = coerce_field(field, column.sql_type, &self.opts.null_sentinel, index)?;
            if let Some(c) = coercion {
                warn!(index = c.index, raw = %c.raw, column = %column.name, "value is not a real number");
                coercions.push(c);
            }
            values.push(value);
        }

        let row = self.schema.row(values)?;
        Ok(DecodedRow { row, coercions })
    }
}

/// Apply NULL handling and type coercion to one field.
///
/// NULL wins over the declared type: the sentinel (compared after trimming) and blank fields
/// are NULL for every column type.
pub fn coerce_field(
    raw: &str,
    sql_type: SqlType,
    null_sentinel: &str,
    index: usize,
) -> Result<(Value, Option<FieldCoercion>), DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == null_sentinel {
        return Ok((Value::Null, None));
    }

    match sql_type {
        SqlType::Integer => trimmed
            .parse::<i64>()
            .map(|v| (Value::Integer(v), None))
            .map_err(|_| DecodeError::Integer {
                index,
                raw: raw.to_string(),
            }),
        SqlType::Real => match trimmed.parse::<f64>() {
            Ok(v) => Ok((Value::Real(v), None)),
            Err(_) => Ok((
                Value::Text(trimmed.to_string()),
                Some(FieldCoercion {
                    index,
                    raw: raw.to_string(),
                }),
            )),
        },
        SqlType::Text => Ok((Value::Text(raw.trim_end().to_string()), None)),
    }
}

/// Slice `line` at byte offsets, clamping to its length.
fn byte_slice(line: &str, start: usize, end: usize) -> Cow<'_, str> {
    let bytes = line.as_bytes();
    let end = end.min(bytes.len());
    let start = start.min(end);
    match line.get(start..end) {
        Some(s) => Cow::Borrowed(s),
        None => String::from_utf8_lossy(&bytes[start..end]),
    }
}
