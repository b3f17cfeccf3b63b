//! Column-name and format-line parsing.
//!
//! A file declares its columns in two header lines, e.g.
//!
//! ```text
//! # last   middle    first    age     income
//! #  sn      s         s       i        f
//! ```
//!
//! In delimited mode a format token's first character selects the type (`i`/`l` integer,
//! `f`/`d` real, anything else text); a `u` anywhere marks the column `UNIQUE NOT NULL`, otherwise
//! an `n` marks it `NOT NULL`. In fixed-width mode every token is `<type><length>`
//! (e.g. `f8`) and byte spans are accumulated left to right from offset 0.

use crate::config::LoadOptions;
use crate::error::{LoadError, LoadResult};
use crate::types::{ColumnSpec, ParseMode, SqlType};

/// Type and constraint information from one format token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatToken {
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
    pub fixed_span: Option<(usize, usize)>,
}

/// Parse the column-name line. Names are trimmed; ignored columns are dropped.
pub fn parse_column_names(line: &str, opts: &LoadOptions, line_no: usize) -> LoadResult<Vec<String>> {
    let names: Vec<String> = opts
        .retained_fields(line)
        .into_iter()
        .map(|f| f.trim().to_string())
        .collect();

    if names.is_empty() {
        return Err(format_error(line_no, "column-name line declares no columns"));
    }
    if let Some(pos) = names.iter().position(|n| n.is_empty()) {
        return Err(format_error(line_no, format!("column {} has an empty name", pos + 1)));
    }
    for (i, name) in names.iter().enumerate() {
        if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(format_error(line_no, format!("duplicate column name '{name}'")));
        }
    }
    Ok(names)
}

/// Parse the format line according to `opts.mode`.
pub fn parse_formats(line: &str, opts: &LoadOptions, line_no: usize) -> LoadResult<Vec<FormatToken>> {
    let tokens: Vec<String> = opts
        .retained_fields(line)
        .into_iter()
        .map(|f| f.trim().to_ascii_lowercase())
        .collect();

    match opts.mode {
        ParseMode::Delimited => Ok(tokens.iter().map(|t| delimited_token(t)).collect()),
        ParseMode::FixedWidth => {
            let mut offset = 0usize;
            let mut out = Vec::with_capacity(tokens.len());
            for token in &tokens {
                let (sql_type, len) = fixed_width_token(token, line_no)?;
                out.push(FormatToken {
                    sql_type,
                    nullable: true,
                    unique: false,
                    fixed_span: Some((offset, offset + len)),
                });
                offset += len;
            }
            Ok(out)
        }
    }
}

/// Combine names and formats into column specs (identifier column not included).
pub fn build_columns(names: &[String], formats: &[FormatToken], line_no: usize) -> LoadResult<Vec<ColumnSpec>> {
    if names.len() != formats.len() {
        return Err(format_error(
            line_no,
            format!(
                "{} column names but {} format tokens",
                names.len(),
                formats.len()
            ),
        ));
    }
    Ok(names
        .iter()
        .zip(formats)
        .map(|(name, fmt)| ColumnSpec {
            name: name.clone(),
            sql_type: fmt.sql_type,
            nullable: fmt.nullable,
            unique: fmt.unique,
            fixed_span: fmt.fixed_span,
        })
        .collect())
}

/// Parse both header lines into column specs.
pub fn parse_descriptors(names_line: &str, format_line: &str, opts: &LoadOptions) -> LoadResult<Vec<ColumnSpec>> {
    let names = parse_column_names(names_line, opts, opts.column_line)?;
    let formats = parse_formats(format_line, opts, opts.format_line)?;
    build_columns(&names, &formats, opts.format_line)
}

fn delimited_token(token: &str) -> FormatToken {
    let sql_type = match token.chars().next() {
        Some('i' | 'l') => SqlType::Integer,
        Some('f' | 'd') => SqlType::Real,
        _ => SqlType::Text,
    };
    let unique = token.contains('u');
    let not_null = unique || token.contains('n');
    FormatToken {
        sql_type,
        nullable: !not_null,
        unique,
        fixed_span: None,
    }
}

fn fixed_width_token(token: &str, line_no: usize) -> LoadResult<(SqlType, usize)> {
    let mut chars = token.chars();
    let sql_type = match chars.next() {
        Some('i' | 'l') => SqlType::Integer,
        Some('f' | 'd') => SqlType::Real,
        Some('s' | 'a') => SqlType::Text,
        Some(c) => {
            return Err(format_error(
                line_no,
                format!("unknown type character '{c}' in fixed-width token '{token}'"),
            ));
        }
        None => return Err(format_error(line_no, "empty fixed-width token")),
    };
    let len: usize = chars.as_str().parse().map_err(|_| {
        format_error(line_no, format!("invalid field length in fixed-width token '{token}'"))
    })?;
    if len == 0 {
        return Err(format_error(line_no, format!("zero field length in token '{token}'")));
    }
    Ok((sql_type, len))
}

fn format_error(line: usize, message: impl Into<String>) -> LoadError {
    LoadError::Format {
        line,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> LoadOptions {
        LoadOptions {
            mode: ParseMode::FixedWidth,
            ..Default::default()
        }
    }

    #[test]
    fn delimited_tokens_select_type_and_constraint() {
        let f = parse_formats(" sn  s  i  f  lu  dn  a", &LoadOptions::default(), 2).unwrap();
        let summary: Vec<_> = f.iter().map(|t| (t.sql_type, t.nullable, t.unique)).collect();
        assert_eq!(
            summary,
            vec![
                (SqlType::Text, false, false),
                (SqlType::Text, true, false),
                (SqlType::Integer, true, false),
                (SqlType::Real, true, false),
                (SqlType::Integer, false, true),
                (SqlType::Real, false, false),
                (SqlType::Text, true, false),
            ]
        );
        assert!(f.iter().all(|t| t.fixed_span.is_none()));
    }

    #[test]
    fn format_tokens_are_case_insensitive() {
        let f = parse_formats("I FU", &LoadOptions::default(), 2).unwrap();
        assert_eq!(f[0].sql_type, SqlType::Integer);
        assert_eq!(f[1].sql_type, SqlType::Real);
        assert!(f[1].unique);
    }

    #[test]
    fn fixed_width_spans_accumulate_from_zero() {
        let f = parse_formats("s10 i4 f8", &fixed(), 2).unwrap();
        let spans: Vec<_> = f.iter().map(|t| t.fixed_span.unwrap()).collect();
        assert_eq!(spans, vec![(0, 10), (10, 14), (14, 22)]);
        assert!(f.iter().all(|t| t.nullable && !t.unique));
    }

    #[test]
    fn fixed_width_rejects_malformed_tokens() {
        let err = parse_formats("s10 x4", &fixed(), 2).unwrap_err();
        assert!(err.to_string().contains("unknown type character 'x'"));
        let err = parse_formats("s10 iab", &fixed(), 2).unwrap_err();
        assert!(err.to_string().contains("invalid field length"));
        assert!(parse_formats("i0", &fixed(), 2).is_err());
    }

    #[test]
    fn ignored_columns_are_dropped_from_both_lines() {
        let opts = LoadOptions {
            ignore_columns: [0].into_iter().collect(),
            ..Default::default()
        };
        let cols = parse_descriptors("junk a b", "s i f", &opts).unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(cols[0].sql_type, SqlType::Integer);
    }

    #[test]
    fn literal_separator_allows_spaces_in_names() {
        let opts = LoadOptions {
            separator: crate::config::Separator::Literal("|".into()),
            ..Default::default()
        };
        let names = parse_column_names(" first name | age ", &opts, 1).unwrap();
        assert_eq!(names, vec!["first name", "age"]);
    }

    #[test]
    fn mismatched_counts_are_a_format_error() {
        let err = parse_descriptors("a b c", "s s", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Format { line: 2, .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(parse_column_names("a b A", &LoadOptions::default(), 1).is_err());
    }
}
