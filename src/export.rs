// src/export.rs

use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{fs, fs::File, path::Path};
use tracing::{info, instrument};

use crate::error::Result;
use crate::process::OrdersTable;

/// Write the transformed table to a Snappy-compressed Parquet file.
#[instrument(level = "info", skip(table), fields(path = %path.as_ref().display()))]
pub fn write_parquet(table: &OrdersTable, path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, table.schema(), Some(props))?;
    writer.write(table.batch())?;
    writer.close()?;

    let bytes = fs::metadata(path)?.len();
    info!(rows = table.num_rows(), bytes, "wrote snapshot");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;
    use crate::process::load_orders;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    #[test]
    fn snapshot_preserves_rows_and_schema() {
        let data = "Order Date,Sales,Region\n2022-01-01,10,West\nbad,5,East\n";
        let (table, _) = load_orders(data.as_bytes(), &TransformConfig::default()).unwrap();

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out").join("orders.parquet");
        let bytes = write_parquet(&table, &path).unwrap();
        assert!(bytes > 0);

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches[0].schema().fields().len(), table.schema().fields().len());
        assert!(batches[0].schema().field_with_name("order_year_month").is_ok());
    }
}
