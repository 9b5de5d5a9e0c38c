//! Retail orders pipeline: fetch a CSV, reshape it in memory, load it into
//! DuckDB, and run a fixed catalog of analytics queries.

pub mod config;
pub mod duck;
pub mod error;
pub mod export;
pub mod fetch;
pub mod pipeline;
pub mod process;

pub use config::{DateParsing, LoadMode, PipelineConfig};
pub use duck::{Query, QueryResult, Store};
pub use error::{Error, Result};
pub use process::{OrderRecord, OrdersTable};
