use arrow::{
    array::{Array, ArrayRef, AsArray},
    datatypes::{DataType, Date32Type, Float64Type, Int32Type, Int64Type},
};
use duckdb::{appender_params_from_iter, types::Value};
use std::time::Instant;
use tracing::{info, instrument};

use super::{quote_column, quote_identifier, Store};
use crate::config::LoadMode;
use crate::error::{Error, Result};
use crate::process::OrdersTable;

/// DuckDB column type for an Arrow type produced by the transform.
pub fn sql_type(dt: &DataType) -> Result<&'static str> {
    Ok(match dt {
        DataType::Float64 => "DOUBLE",
        DataType::Int64 => "BIGINT",
        DataType::Int32 => "INTEGER",
        DataType::Date32 => "DATE",
        DataType::Utf8 => "VARCHAR",
        other => {
            return Err(Error::Schema(format!(
                "no store column type for Arrow type {other}"
            )))
        }
    })
}

/// `CREATE TABLE` statement matching the table's schema.
pub fn create_table_sql(table: &OrdersTable, name: &str, mode: LoadMode) -> Result<String> {
    let columns = table
        .schema()
        .fields()
        .iter()
        .map(|f| Ok(format!("{} {}", quote_column(f.name()), sql_type(f.data_type())?)))
        .collect::<Result<Vec<_>>>()?;
    let create = match mode {
        LoadMode::Replace => "CREATE TABLE",
        LoadMode::Append => "CREATE TABLE IF NOT EXISTS",
    };
    Ok(format!(
        "{create} {} (\n    {}\n);",
        quote_identifier(name)?,
        columns.join(",\n    ")
    ))
}

fn cell(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Float64 => Value::Double(array.as_primitive::<Float64Type>().value(row)),
        DataType::Int64 => Value::BigInt(array.as_primitive::<Int64Type>().value(row)),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row)),
        DataType::Date32 => Value::Date32(array.as_primitive::<Date32Type>().value(row)),
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        _ => Value::Null,
    }
}

/// Column names of an existing `name` in declaration order, or `None` when the
/// table does not exist yet.
pub fn existing_columns(store: &Store, name: &str) -> Result<Option<Vec<String>>> {
    let ctx = || format!("table `{name}`");
    let mut stmt = store
        .connection()
        .prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = ?
             ORDER BY ordinal_position",
        )
        .map_err(|e| Error::load(ctx(), e))?;
    let columns = stmt
        .query_map([name], |r| r.get::<_, String>(0))
        .and_then(|rows| rows.collect::<duckdb::Result<Vec<_>>>())
        .map_err(|e| Error::load(ctx(), e))?;
    Ok((!columns.is_empty()).then_some(columns))
}

/// The table's arrays in the order of `target`, matched by name.
///
/// The column sets must be equal; extra or missing columns are a schema error.
fn align_columns(table: &OrdersTable, name: &str, target: &[String]) -> Result<Vec<ArrayRef>> {
    let incoming = table.column_names();
    let mismatch = || {
        Error::Schema(format!(
            "cannot append to `{name}`: table has columns [{}], incoming rows have [{}]",
            target.join(", "),
            incoming.join(", ")
        ))
    };
    if incoming.len() != target.len() {
        return Err(mismatch());
    }
    target
        .iter()
        .map(|col| table.column(col).cloned().ok_or_else(mismatch))
        .collect()
}

/// Persist every row of `table` into `name`.
///
/// `Replace` drops and recreates the target; `Append` creates it when missing
/// and inserts alongside existing rows, matching columns by name. Rows go through the DuckDB appender and
/// are not wrapped in a transaction, so a failure part-way can leave the target
/// partially written. Returns the number of rows written.
#[instrument(level = "info", skip(store, table), fields(rows = table.num_rows()))]
pub fn load_table(store: &Store, table: &OrdersTable, name: &str, mode: LoadMode) -> Result<usize> {
    let conn = store.connection();
    let quoted = quote_identifier(name)?;
    let ddl = create_table_sql(table, name, mode)?;
    let ctx = || format!("table `{name}`");

    let columns = match mode {
        LoadMode::Replace => {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {quoted};"))
                .map_err(|e| Error::load(ctx(), e))?;
            None
        }
        LoadMode::Append => existing_columns(store, name)?,
    };
    let columns = match columns {
        Some(existing) => align_columns(table, name, &existing)?,
        None => {
            conn.execute_batch(&ddl).map_err(|e| Error::load(ctx(), e))?;
            table.batch().columns().to_vec()
        }
    };

    let start = Instant::now();
    let rows = table.num_rows();
    let mut appender = conn.appender(name).map_err(|e| Error::load(ctx(), e))?;
    for row in 0..rows {
        let values: Vec<Value> = columns.iter().map(|col| cell(col, row)).collect();
        appender
            .append_row(appender_params_from_iter(values))
            .map_err(|e| Error::load(format!("{} at row {}", ctx(), row + 1), e))?;
    }
    appender.flush().map_err(|e| Error::load(ctx(), e))?;

    info!(
        table = name,
        ?mode,
        rows,
        elapsed = ?start.elapsed(),
        "loaded"
    );
    Ok(rows)
}
