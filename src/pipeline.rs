// src/pipeline.rs

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::{LoadMode, PipelineConfig, StoreConfig};
use crate::duck::{load_table, queries::format_batches, Query, QueryResult, Store};
use crate::error::Result;
use crate::export;
use crate::process::{self, OrdersTable, TransformStats};

/// One executed catalog query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub query: &'static str,
    pub description: &'static str,
    pub rows: QueryResult,
    /// Text-table rendering of the same result.
    #[serde(skip)]
    pub rendered: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub table: String,
    pub mode: LoadMode,
    pub transform: TransformStats,
    pub snapshot_bytes: Option<u64>,
    pub rows_loaded: usize,
    pub rows_persisted: u64,
    pub queries: Vec<QueryOutput>,
}

/// Run `queries` against `table`, in order, stopping at the first failure.
/// Each query executes once; rows and text come from the same batches.
pub fn run_queries(store: &Store, table: &str, queries: &[Query]) -> Result<Vec<QueryOutput>> {
    queries
        .iter()
        .map(|&q| {
            let batches = q.batches(store, table)?;
            Ok(QueryOutput {
                query: q.name(),
                description: q.describe(),
                rows: q.rows(&batches)?,
                rendered: format_batches(&batches)?,
            })
        })
        .collect()
}

fn load_and_query(
    store: &Store,
    table: &OrdersTable,
    cfg: &StoreConfig,
) -> Result<(usize, u64, Vec<QueryOutput>)> {
    let loaded = load_table(store, table, &cfg.table, cfg.mode)?;
    let persisted = store.row_count(&cfg.table)?;
    if cfg.mode == LoadMode::Replace && persisted != loaded as u64 {
        warn!(loaded, persisted, "persisted row count differs from rows loaded");
    }
    let queries = run_queries(store, &cfg.table, &Query::ALL)?;
    Ok((loaded, persisted, queries))
}

/// Transform → snapshot → load → queries over already-fetched CSV bytes.
///
/// The store is opened for this call only and closed before returning,
/// whether or not the load and queries succeeded.
#[instrument(level = "info", skip_all, fields(table = %cfg.store.table, mode = ?cfg.store.mode))]
pub fn run(csv: &[u8], cfg: &PipelineConfig) -> Result<RunReport> {
    cfg.validate()?;

    let (table, transform) = process::load_orders(csv, &cfg.transform)?;
    let snapshot_bytes = cfg
        .snapshot
        .as_ref()
        .map(|path| export::write_parquet(&table, path))
        .transpose()?;

    let store = Store::open(&cfg.store.connection)?;
    let outcome = load_and_query(&store, &table, &cfg.store);
    let closed = store.close();
    let (rows_loaded, rows_persisted, queries) = outcome?;
    closed?;

    info!(rows_loaded, rows_persisted, "pipeline finished");
    Ok(RunReport {
        table: cfg.store.table.clone(),
        mode: cfg.store.mode,
        transform,
        snapshot_bytes,
        rows_loaded,
        rows_persisted,
        queries,
    })
}

/// Query an already-loaded store without touching its contents.
#[instrument(level = "info", skip_all, fields(table = %cfg.table))]
pub fn query(cfg: &StoreConfig, queries: &[Query]) -> Result<Vec<QueryOutput>> {
    let store = Store::open(&cfg.connection)?;
    let outcome = run_queries(&store, &cfg.table, queries);
    let closed = store.close();
    let out = outcome?;
    closed?;
    Ok(out)
}
