// src/process/mod.rs
use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use serde::Serialize;
use std::{collections::HashSet, io::Read, sync::Arc};
use tracing::{debug, info, warn};

use crate::config::{DateParsing, TransformConfig};
use crate::error::{Error, Result};

pub mod convert;
pub mod date_parser;
pub mod table;
pub mod utils;

pub use table::{OrderRecord, OrdersTable};

use convert::ColumnKind;

/// Source columns the transform cannot do without.
pub const REQUIRED_COLUMNS: [&str; 2] = ["order_date", "sales"];

/// Columns computed from `order_date`; same-named source columns are replaced.
pub const DERIVED_DATE_COLUMNS: [&str; 3] = ["order_year", "order_month", "order_year_month"];

#[derive(Debug)]
pub struct RawTable {
    /// Header row exactly as the file has it.
    pub headers: Vec<String>,
    /// Each data row, one string per field.
    pub rows: Vec<Vec<String>>,
}

/// Counters reported by [`transform`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub rows: usize,
    /// Rows whose `order_date` ended up null (missing or unparseable).
    pub null_dates: usize,
    pub unparsed_dates: usize,
    pub unparsed_numbers: usize,
    /// Whether `sale_price` was copied from `sales`.
    pub sale_price_derived: bool,
}

/// Read a headed CSV into memory. Ragged rows are an error.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    debug!(rows = rows.len(), "read CSV");
    Ok(RawTable { headers, rows })
}

/// Normalize, type, and extend a raw table into an [`OrdersTable`].
#[tracing::instrument(level = "info", skip_all, fields(rows = raw.rows.len()))]
pub fn transform(raw: &RawTable, cfg: &TransformConfig) -> Result<(OrdersTable, TransformStats)> {
    let names: Vec<String> = raw
        .headers
        .iter()
        .map(|h| utils::normalize_column_name(h))
        .collect();

    let mut seen = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(Error::Schema(format!(
            "column `{dup}` appears more than once after normalization"
        )));
    }

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|req| !names.iter().any(|n| n == req))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Schema(format!(
            "required column(s) missing: {}",
            missing.join(", ")
        )));
    }

    let mut stats = TransformStats {
        rows: raw.rows.len(),
        ..Default::default()
    };
    let mut fields = Vec::with_capacity(names.len() + 4);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len() + 4);
    let mut dates = Vec::new();
    let mut sales = None;

    for (i, name) in names.iter().enumerate() {
        if DERIVED_DATE_COLUMNS.contains(&name.as_str()) {
            warn!(column = %name, "source column replaced by derived value");
            continue;
        }

        let cells: Vec<Option<&str>> = raw
            .rows
            .iter()
            .map(|row| utils::cell(row.get(i).map(String::as_str), &cfg.na_values))
            .collect();

        let kind = ColumnKind::of(name);
        let array = match kind {
            ColumnKind::Date => {
                let (parsed, failed) =
                    convert::parse_dates(&cells, &cfg.date_format, cfg.date_parsing)?;
                stats.unparsed_dates = failed;
                let col = convert::date_column(&parsed);
                dates = parsed;
                col
            }
            ColumnKind::Float => {
                let (col, failed) = convert::float_column(&cells);
                stats.unparsed_numbers += failed;
                col
            }
            ColumnKind::Int => {
                let (col, failed) = convert::int_column(&cells);
                stats.unparsed_numbers += failed;
                col
            }
            ColumnKind::Text => convert::text_column(&cells),
        };

        if name == "sales" {
            sales = Some(array.clone());
        }
        fields.push(Field::new(name, kind.data_type(), true));
        columns.push(array);
    }

    check_non_negative(&fields, &columns, cfg.date_parsing)?;

    if !names.iter().any(|n| n == "sale_price") {
        let sales = sales.ok_or_else(|| Error::Schema("required column `sales` missing".into()))?;
        fields.push(Field::new("sale_price", DataType::Float64, true));
        columns.push(sales);
        stats.sale_price_derived = true;
    }

    let [years, months, keys] = convert::date_parts(&dates);
    fields.push(Field::new("order_year", DataType::Int32, true));
    fields.push(Field::new("order_month", DataType::Int32, true));
    fields.push(Field::new("order_year_month", DataType::Utf8, true));
    columns.extend([years, months, keys]);

    stats.null_dates = dates.iter().filter(|d| d.is_none()).count();
    if stats.unparsed_numbers > 0 {
        warn!(cells = stats.unparsed_numbers, "non-numeric values stored as null");
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    info!(
        rows = stats.rows,
        columns = batch.num_columns(),
        null_dates = stats.null_dates,
        "transformed orders"
    );
    Ok((OrdersTable::new(batch)?, stats))
}

/// Sales and discount are expected to be non-negative; profit may go below
/// zero. Strict mode rejects violations, lenient mode only reports them.
fn check_non_negative(fields: &[Field], columns: &[ArrayRef], policy: DateParsing) -> Result<()> {
    use arrow::array::AsArray;
    use arrow::datatypes::Float64Type;

    for (field, col) in fields.iter().zip(columns) {
        if !matches!(field.name().as_str(), "sales" | "discount") {
            continue;
        }
        let Some(values) = col.as_primitive_opt::<Float64Type>() else {
            continue;
        };
        let negatives = values.iter().flatten().filter(|v| *v < 0.0).count();
        if negatives == 0 {
            continue;
        }
        if policy == DateParsing::Strict {
            return Err(Error::Validation(format!(
                "{negatives} negative value(s) in `{}`",
                field.name()
            )));
        }
        warn!(column = %field.name(), negatives, "negative values");
    }
    Ok(())
}

/// Read and transform in one step.
pub fn load_orders<R: Read>(reader: R, cfg: &TransformConfig) -> Result<(OrdersTable, TransformStats)> {
    let raw = read_csv(reader)?;
    transform(&raw, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HEADER: &str =
        "Order Id,Order Date,Ship Mode,Region,Category,Sub Category,Product Id,Sales,Discount,Profit,Quantity";

    fn csv(rows: &[&str]) -> String {
        let mut s = format!("{HEADER}\n");
        for r in rows {
            s.push_str(r);
            s.push('\n');
        }
        s
    }

    fn lenient() -> TransformConfig {
        TransformConfig::default()
    }

    fn strict() -> TransformConfig {
        TransformConfig {
            date_parsing: DateParsing::Strict,
            ..TransformConfig::default()
        }
    }

    #[test]
    fn normalizes_and_derives() {
        let data = csv(&[
            "1,2023-03-01,Second Class,South,Furniture,Bookcases,FUR-BO-1,260,5.2,-3.1,2",
            "2,2022-08-15,Not Available,West,Technology,Phones,TEC-PH-1,120.5,0,12,1",
        ]);
        let (table, stats) = load_orders(data.as_bytes(), &lenient()).unwrap();

        let names = table.column_names();
        for expected in [
            "order_id",
            "order_date",
            "ship_mode",
            "sub_category",
            "product_id",
            "sale_price",
            "order_year",
            "order_month",
            "order_year_month",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}: {names:?}");
        }
        assert!(stats.sale_price_derived);
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.null_dates, 0);

        let recs = table.records();
        assert_eq!(recs[0].order_date, NaiveDate::from_ymd_opt(2023, 3, 1));
        assert_eq!(recs[0].order_year, Some(2023));
        assert_eq!(recs[0].order_month, Some(3));
        assert_eq!(recs[0].order_year_month.as_deref(), Some("202303"));
        assert_eq!(recs[0].profit, Some(-3.1));
        assert_eq!(recs[0].discount, Some(5.2));
        assert_eq!(recs[0].quantity, Some(2));
        assert_eq!(recs[1].sub_category.as_deref(), Some("Phones"));
    }

    #[test]
    fn sale_price_aliases_sales_when_absent() {
        let data = csv(&[
            "1,2023-01-01,Standard,East,Office,Paper,OFF-PA-1,10,0,1,1",
            "2,2023-01-02,Standard,East,Office,Paper,OFF-PA-2,,0,1,1",
            "3,2023-01-03,Standard,East,Office,Paper,OFF-PA-3,99.99,0,1,1",
        ]);
        let (table, _) = load_orders(data.as_bytes(), &lenient()).unwrap();
        for rec in table.records() {
            assert_eq!(rec.sale_price, rec.sales);
        }
    }

    #[test]
    fn existing_sale_price_is_untouched() {
        let data = "order_date,sales,sale_price\n2023-01-01,10,7.5\n";
        let (table, stats) = load_orders(data.as_bytes(), &lenient()).unwrap();
        assert!(!stats.sale_price_derived);
        let rec = &table.records()[0];
        assert_eq!(rec.sales, Some(10.0));
        assert_eq!(rec.sale_price, Some(7.5));
        assert_eq!(
            table.column_names().iter().filter(|n| *n == "sale_price").count(),
            1
        );
    }

    #[test]
    fn date_parts_follow_parsed_date() {
        let data = csv(&[
            "1,2022-12-31,S,East,C,Sub,P,1,0,0,1",
            "2,2023-01-01,S,East,C,Sub,P,1,0,0,1",
            "3,2024-02-29,S,East,C,Sub,P,1,0,0,1",
        ]);
        let (table, _) = load_orders(data.as_bytes(), &lenient()).unwrap();
        for rec in table.records() {
            let d = rec.order_date.unwrap();
            assert_eq!(rec.order_year, Some(chrono::Datelike::year(&d)));
            assert_eq!(rec.order_month, Some(chrono::Datelike::month(&d) as i32));
        }
    }

    #[test]
    fn bad_date_is_null_when_lenient() {
        let data = "Order Date,Sales\nnot a date,10\n2022-01-01,5\n";
        let (table, stats) = load_orders(data.as_bytes(), &lenient()).unwrap();
        assert_eq!(stats.unparsed_dates, 1);
        assert_eq!(stats.null_dates, 1);
        let recs = table.records();
        assert_eq!(recs[0].order_date, None);
        assert_eq!(recs[0].order_year, None);
        assert_eq!(recs[0].order_year_month, None);
        assert_eq!(recs[1].order_year, Some(2022));
    }

    #[test]
    fn bad_date_fails_when_strict() {
        let data = "Order Date,Sales\nnot a date,10\n";
        let err = load_orders(data.as_bytes(), &strict()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    }

    #[test]
    fn negative_sales_fail_only_when_strict() {
        let data = "Order Date,Sales,Profit\n2022-01-01,-4,-9\n";
        assert!(load_orders(data.as_bytes(), &lenient()).is_ok());
        let err = load_orders(data.as_bytes(), &strict()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");

        let only_profit = "Order Date,Sales,Profit\n2022-01-01,4,-9\n";
        assert!(load_orders(only_profit.as_bytes(), &strict()).is_ok());
    }

    #[test]
    fn missing_required_columns() {
        let err = load_orders("order_id,region\n1,West\n".as_bytes(), &lenient()).unwrap_err();
        match err {
            Error::Schema(msg) => {
                assert!(msg.contains("order_date") && msg.contains("sales"), "{msg}");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_normalized_columns() {
        let data = "Order Date,order_date,Sales\n2022-01-01,2022-01-01,1\n";
        let err = load_orders(data.as_bytes(), &lenient()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)), "got {err:?}");
    }

    #[test]
    fn header_only_gives_empty_table() {
        let (table, stats) = load_orders(csv(&[]).as_bytes(), &lenient()).unwrap();
        assert!(table.is_empty());
        assert_eq!(stats.rows, 0);
        assert!(table.column_names().iter().any(|n| n == "sale_price"));
    }

    #[test]
    fn na_markers_become_null() {
        let data = csv(&["1,2023-01-01,unknown,West,C,Sub,P,1,0,0,1"]);
        let (table, _) = load_orders(data.as_bytes(), &lenient()).unwrap();
        use arrow::array::{Array, AsArray};
        let ship = table.column("ship_mode").unwrap().as_string::<i32>();
        assert!(ship.is_null(0));
        assert_eq!(table.records()[0].region.as_deref(), Some("West"));
    }

    #[test]
    fn source_derived_columns_are_replaced() {
        let data = "order_date,sales,order_year\n2023-05-06,1,1999\n";
        let (table, _) = load_orders(data.as_bytes(), &lenient()).unwrap();
        assert_eq!(
            table.column_names().iter().filter(|n| *n == "order_year").count(),
            1
        );
        assert_eq!(table.records()[0].order_year, Some(2023));
    }

    #[test]
    fn ragged_rows_are_read_errors() {
        let err = load_orders("order_date,sales\n2023-01-01\n".as_bytes(), &lenient()).unwrap_err();
        assert!(matches!(err, Error::Read(_)), "got {err:?}");
    }
}
