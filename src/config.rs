//! Load options.
//!
//! [`LoadOptions`] is passed by reference into the format parser, row decoder and batch loader;
//! there is no process-wide option state. Options can be built in code, read from a JSON file
//! with [`LoadOptions::from_json_file`], or assembled by the command-line front end.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};
use crate::types::ParseMode;

pub const DEFAULT_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_COMMIT_EVERY: usize = 100_000;
pub const DEFAULT_NULL_SENTINEL: &str = "null";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 10_000;

/// Field separator for header and data lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Separator {
    /// Runs of whitespace; leading and trailing whitespace produce no fields.
    #[default]
    Whitespace,
    /// A literal separator string; adjacent separators produce empty fields.
    Literal(String),
}

impl Separator {
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Separator::Whitespace => line.split_whitespace().collect(),
            Separator::Literal(sep) => line.split(sep.as_str()).collect(),
        }
    }
}

impl From<Option<String>> for Separator {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => Separator::Literal(s),
            None => Separator::Whitespace,
        }
    }
}

impl From<Separator> for Option<String> {
    fn from(value: Separator) -> Self {
        match value {
            Separator::Whitespace => None,
            Separator::Literal(s) => Some(s),
        }
    }
}

/// Constraint-violation resolution applied to every insert (`INSERT OR <policy>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Abort,
    Fail,
    Ignore,
    Replace,
    Rollback,
}

impl ConflictPolicy {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConflictPolicy::Abort => "ABORT",
            ConflictPolicy::Fail => "FAIL",
            ConflictPolicy::Ignore => "IGNORE",
            ConflictPolicy::Replace => "REPLACE",
            ConflictPolicy::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_sql().to_ascii_lowercase())
    }
}

impl FromStr for ConflictPolicy {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "fail" => Ok(Self::Fail),
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            "rollback" => Ok(Self::Rollback),
            other => Err(LoadError::config(format!(
                "unknown conflict policy '{other}' (expected abort, fail, ignore, replace or rollback)"
            ))),
        }
    }
}

/// Options controlling how text files are parsed and loaded.
///
/// Use [`Default`] for the common case: whitespace-separated columns, column names on line 1,
/// formats on line 2, `null` as NULL marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Target table. If `None`, derived from the database file name.
    pub table: Option<String>,
    /// 1-based line number holding the column names.
    pub column_line: usize,
    /// 1-based line number holding the format description.
    pub format_line: usize,
    pub separator: Separator,
    /// Literal string that denotes a NULL value.
    pub null_sentinel: String,
    pub mode: ParseMode,
    /// Rows buffered before one batched insert.
    pub batch_size: usize,
    /// Rows loaded between commits.
    pub commit_every: usize,
    pub conflict: ConflictPolicy,
    /// Zero-based input column indices dropped before parsing.
    pub ignore_columns: BTreeSet<usize>,
    /// Number of leading lines skipped entirely.
    pub skip_lines: usize,
    /// Marker in column 1 of header and comment lines.
    pub comment_marker: char,
    pub busy_timeout_ms: u64,
    /// Run with `PRAGMA synchronous=OFF`.
    pub synchronous_off: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            table: None,
            column_line: 1,
            format_line: 2,
            separator: Separator::Whitespace,
            null_sentinel: DEFAULT_NULL_SENTINEL.to_string(),
            mode: ParseMode::Delimited,
            batch_size: DEFAULT_BATCH_SIZE,
            commit_every: DEFAULT_COMMIT_EVERY,
            conflict: ConflictPolicy::Abort,
            ignore_columns: BTreeSet::new(),
            skip_lines: 0,
            comment_marker: '#',
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            synchronous_off: true,
        }
    }
}

impl LoadOptions {
    /// Read options from a JSON file. Missing keys take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            LoadError::config(format!("cannot parse config file {}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> LoadResult<()> {
        if self.batch_size == 0 {
            return Err(LoadError::config("batch size must be >= 1"));
        }
        if self.commit_every == 0 {
            return Err(LoadError::config("commit interval must be >= 1"));
        }
        if self.column_line == 0 || self.format_line == 0 {
            return Err(LoadError::config("header line numbers are 1-based"));
        }
        if let Separator::Literal(sep) = &self.separator {
            if sep.is_empty() {
                return Err(LoadError::config("separator must not be empty"));
            }
        }
        if matches!(&self.table, Some(t) if t.trim().is_empty()) {
            return Err(LoadError::config("table name must not be empty"));
        }
        Ok(())
    }

    /// Table name to load into: the configured one, or the one derived from `db_path`.
    pub fn table_for(&self, db_path: impl AsRef<Path>) -> String {
        match &self.table {
            Some(t) => t.clone(),
            None => table_name_from_db_path(db_path),
        }
    }

    /// Split `line` on the separator and drop ignored column indices.
    pub fn retained_fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let fields = self.separator.split(line);
        if self.ignore_columns.is_empty() {
            return fields;
        }
        fields
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !self.ignore_columns.contains(i))
            .map(|(_, f)| f)
            .collect()
    }
}

/// Table name derived from a database path: the file name up to its first `.`.
pub fn table_name_from_db_path(db_path: impl AsRef<Path>) -> String {
    let file_name = db_path
        .as_ref()
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    file_name.split('.').next().unwrap_or_default().to_string()
}

/// Read an ignore-list file: whitespace-separated 1-based column numbers.
///
/// Blank lines and lines starting with `#` are skipped. Returns zero-based indices.
pub fn load_ignore_list(path: impl AsRef<Path>) -> LoadResult<BTreeSet<usize>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_ignore_list(&text)
}

fn parse_ignore_list(text: &str) -> LoadResult<BTreeSet<usize>> {
    let mut out = BTreeSet::new();
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        for token in line.split_whitespace() {
            let column: usize = token
                .parse()
                .map_err(|_| LoadError::config(format!("invalid column number '{token}' in ignore list")))?;
            if column == 0 {
                return Err(LoadError::config("column numbers in the ignore list are 1-based"));
            }
            out.insert(column - 1);
        }
    }
    Ok(out)
}

/// Read a file listing input paths, one per line; blank lines are skipped.
pub fn load_file_list(path: impl AsRef<Path>) -> LoadResult<Vec<String>> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_separator_collapses_runs() {
        assert_eq!(Separator::Whitespace.split("  a \t b  c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn literal_separator_keeps_empty_fields() {
        let sep = Separator::Literal("|".into());
        assert_eq!(sep.split("a||c"), vec!["a", "", "c"]);
    }

    #[test]
    fn retained_fields_drop_ignored_indices() {
        let opts = LoadOptions {
            ignore_columns: [1].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(opts.retained_fields("x y z"), vec!["x", "z"]);
    }

    #[test]
    fn ignore_list_is_one_based_and_skips_comments() {
        let parsed = parse_ignore_list("# columns to drop\n2 5\n\n7\n").unwrap();
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![1, 4, 6]);
        assert!(parse_ignore_list("0\n").is_err());
        assert!(parse_ignore_list("two\n").is_err());
    }

    #[test]
    fn table_name_defaults_to_file_stem() {
        assert_eq!(table_name_from_db_path("/data/stars.v2.db"), "stars");
        let opts = LoadOptions {
            table: Some("lc".into()),
            ..Default::default()
        };
        assert_eq!(opts.table_for("/data/stars.db"), "lc");
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let mut opts = LoadOptions::default();
        assert!(opts.validate().is_ok());
        opts.batch_size = 0;
        assert!(opts.validate().is_err());
        opts.batch_size = 1;
        opts.commit_every = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: LoadOptions =
            serde_json::from_str(r#"{"separator": ",", "conflict": "ignore", "batch_size": 10}"#).unwrap();
        assert_eq!(opts.separator, Separator::Literal(",".into()));
        assert_eq!(opts.conflict, ConflictPolicy::Ignore);
        assert_eq!(opts.batch_size, 10);
        assert_eq!(opts.null_sentinel, "null");
        assert_eq!(opts.column_line, 1);
    }

    #[test]
    fn conflict_policy_parses_case_insensitively() {
        assert_eq!("Replace".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Replace);
        assert!("upsert".parse::<ConflictPolicy>().is_err());
    }
}
