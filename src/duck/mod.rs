use duckdb::Connection;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub mod load;
pub mod queries;

pub use load::load_table;
pub use queries::{Query, QueryResult};

/// Exclusive handle on one DuckDB database.
///
/// The connection is released when the handle drops; [`Store::close`]
/// releases it explicitly and reports any close failure.
pub struct Store {
    conn: Connection,
    target: String,
}

impl Store {
    /// Open from a connection string: `:memory:` or empty for an in-memory
    /// database, otherwise a file path with an optional `duckdb://` prefix.
    pub fn open(connection: &str) -> Result<Self> {
        let target = connection.trim();
        let target = target.strip_prefix("duckdb://").unwrap_or(target);
        let ctx = || format!("store `{connection}`");
        let opened = if target.is_empty() || target == ":memory:" {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = Path::new(target).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::load(ctx(), e))?;
                }
            }
            Connection::open(target)
        };
        let conn = opened.map_err(|e| Error::load(ctx(), e))?;
        info!(store = %target, "opened store");
        Ok(Self {
            conn,
            target: target.to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Persisted row count of `table`.
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?);
        let n: i64 = self
            .conn
            .query_row(&sql, [], |r| r.get(0))
            .map_err(|source| Error::Query {
                query: "row-count",
                source,
            })?;
        Ok(n as u64)
    }

    pub fn close(self) -> Result<()> {
        let target = self.target;
        self.conn
            .close()
            .map_err(|(_, e)| Error::load(format!("closing store `{target}`"), e))?;
        debug!(store = %target, "closed store");
        Ok(())
    }
}

/// Table names are restricted to plain SQL identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "`{name}` is not a valid table name (letters, digits, underscores)"
        )))
    }
}

/// Double-quoted identifier, after validation.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

/// Double-quoted column name. Source headers are not restricted, so embedded
/// quotes are doubled instead of rejected.
pub fn quote_column(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn identifiers() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("_df_orders2").is_ok());
        for bad in ["", "2orders", "orders;", "my table", "o\"rders"] {
            assert!(validate_identifier(bad).is_err(), "{bad}");
        }
        assert_eq!(quote_identifier("orders").unwrap(), "\"orders\"");
        assert_eq!(quote_column("sub-category"), "\"sub-category\"");
        assert_eq!(quote_column("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn opens_file_store_with_prefix() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("orders.duckdb");
        let store = Store::open(&format!("duckdb://{}", path.display())).unwrap();
        store
            .connection()
            .execute_batch("CREATE TABLE t(x INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        assert_eq!(store.row_count("t").unwrap(), 2);
        store.close().unwrap();
        assert!(path.exists());

        let reopened = Store::open(path.to_str().unwrap()).unwrap();
        assert_eq!(reopened.row_count("t").unwrap(), 2);
    }

    #[test]
    fn unreachable_store_path_is_load_error() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let target = blocker.join("orders.duckdb");
        let err = Store::open(target.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, Error::Load { .. }), "got {err:?}");
    }

    #[test]
    fn row_count_of_missing_table_is_query_error() {
        let store = Store::open_in_memory().unwrap();
        let err = store.row_count("nope").unwrap_err();
        assert!(matches!(err, Error::Query { .. }), "got {err:?}");
    }
}
