//! Schema resolution: create the target table from header declarations, or adopt an existing
//! table's columns from the catalog.

use tracing::info;

use crate::config::ConflictPolicy;
use crate::error::{LoadError, LoadResult};
use crate::ingestion::format::FormatToken;
use crate::types::{ColumnSpec, IDENTIFIER_COLUMN, SqlType, TableSchema};

use super::{TableStore, quote_ident};

/// `CREATE TABLE` statement for `schema`; the identifier column is declared first.
pub fn create_statement(schema: &TableSchema) -> String {
    let mut parts = Vec::with_capacity(schema.columns().len());
    parts.push(format!(
        "{IDENTIFIER_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL UNIQUE"
    ));
    for column in schema.data_columns() {
        let mut def = format!("{} {}", quote_ident(&column.name), column.sql_type.as_sql());
        let constraint = column.constraint_sql();
        if !constraint.is_empty() {
            def.push(' ');
            def.push_str(constraint);
        }
        parts.push(def);
    }
    format!("CREATE TABLE {} ({});", quote_ident(&schema.table), parts.join(", "))
}

/// Insert template with one placeholder per data column, in schema order.
pub fn insert_statement(schema: &TableSchema, policy: ConflictPolicy) -> String {
    let table = quote_ident(&schema.table);
    let columns = schema.data_columns();
    if columns.is_empty() {
        return format!("INSERT OR {} INTO {table} DEFAULT VALUES;", policy.as_sql());
    }
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let marks = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT OR {} INTO {table} ({}) VALUES ({marks});",
        policy.as_sql(),
        names.join(", ")
    )
}

/// Read back an existing table's schema, or `None` if the table does not exist.
pub fn adopt_existing<S: TableStore + ?Sized>(store: &S, table: &str) -> LoadResult<Option<TableSchema>> {
    if !store.table_exists(table)? {
        return Ok(None);
    }
    let columns: Vec<ColumnSpec> = store
        .table_columns(table)?
        .into_iter()
        .map(|c| ColumnSpec {
            sql_type: SqlType::from_declared(&c.declared_type),
            nullable: !c.not_null,
            unique: false,
            fixed_span: None,
            name: c.name,
        })
        .collect();
    if columns.is_empty() {
        return Err(LoadError::SchemaMismatch {
            table: table.to_string(),
            message: "existing table reports no columns".to_string(),
        });
    }
    info!(table, columns = columns.len() - 1, "adopting existing table");
    Ok(Some(TableSchema::from_catalog(table, columns)))
}

/// Create `table` from parsed header columns and return its schema.
pub fn create_table<S: TableStore + ?Sized>(
    store: &mut S,
    table: &str,
    columns: Vec<ColumnSpec>,
) -> LoadResult<TableSchema> {
    let schema = TableSchema::new(table, columns);
    let sql = create_statement(&schema);
    info!(table, sql = %sql, "creating table");
    store.execute(&sql)?;
    Ok(schema)
}

/// Apply fixed-width spans from a format line to an adopted schema.
///
/// Types stay as the catalog declares them; only the spans are taken from the file. The format
/// line must declare exactly one token per data column.
pub fn reconcile_spans(schema: &mut TableSchema, formats: &[FormatToken]) -> LoadResult<()> {
    if formats.len() != schema.data_column_count() {
        return Err(LoadError::SchemaMismatch {
            table: schema.table.clone(),
            message: format!(
                "table has {} data columns but the format line declares {}",
                schema.data_column_count(),
                formats.len()
            ),
        });
    }
    let spans: Vec<(usize, usize)> = formats.iter().filter_map(|f| f.fixed_span).collect();
    if spans.len() != formats.len() {
        return Err(LoadError::SchemaMismatch {
            table: schema.table.clone(),
            message: "format line carries no fixed-width lengths".to_string(),
        });
    }
    schema.set_spans(&spans);
    Ok(())
}
