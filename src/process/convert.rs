use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray},
    datatypes::DataType,
};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::warn;

use crate::config::DateParsing;
use crate::error::{Error, Result};
use crate::process::date_parser;

/// Storage type of a normalized source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Float,
    Int,
    Text,
}

impl ColumnKind {
    pub fn of(name: &str) -> Self {
        match name {
            "order_date" => ColumnKind::Date,
            "sales" | "sale_price" | "discount" | "profit" => ColumnKind::Float,
            "quantity" => ColumnKind::Int,
            _ => ColumnKind::Text,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

pub fn text_column(cells: &[Option<&str>]) -> ArrayRef {
    Arc::new(cells.iter().copied().collect::<StringArray>())
}

/// Parse floats; returns the array and how many non-null cells failed.
pub fn float_column(cells: &[Option<&str>]) -> (ArrayRef, usize) {
    let mut failed = 0;
    let arr: Float64Array = cells
        .iter()
        .map(|c| {
            c.and_then(|s| {
                let v = s.parse::<f64>().ok().filter(|v| v.is_finite());
                failed += v.is_none() as usize;
                v
            })
        })
        .collect();
    (Arc::new(arr), failed)
}

pub fn int_column(cells: &[Option<&str>]) -> (ArrayRef, usize) {
    let mut failed = 0;
    let arr: Int64Array = cells
        .iter()
        .map(|c| {
            c.and_then(|s| {
                let v = s.parse::<i64>().ok();
                failed += v.is_none() as usize;
                v
            })
        })
        .collect();
    (Arc::new(arr), failed)
}

/// Parse `order_date` cells. Missing cells stay null under either policy;
/// present-but-unparseable cells are null (lenient) or an error (strict).
///
/// Returns the parsed dates and the count of unparseable cells.
pub fn parse_dates(
    cells: &[Option<&str>],
    format: &str,
    policy: DateParsing,
) -> Result<(Vec<Option<NaiveDate>>, usize)> {
    let mut failed = 0;
    let mut out = Vec::with_capacity(cells.len());
    for (row, cell) in cells.iter().enumerate() {
        let Some(s) = cell else {
            out.push(None);
            continue;
        };
        match date_parser::parse_order_date(s, format) {
            Some(d) => out.push(Some(d)),
            None if policy == DateParsing::Strict => {
                return Err(Error::Validation(format!(
                    "data row {}: order_date `{s}` does not match format `{format}`",
                    row + 1
                )));
            }
            None => {
                if failed == 0 {
                    warn!(row = row + 1, value = %s, format, "unparseable order_date, storing null");
                }
                failed += 1;
                out.push(None);
            }
        }
    }
    Ok((out, failed))
}

pub fn date_column(dates: &[Option<NaiveDate>]) -> ArrayRef {
    Arc::new(
        dates
            .iter()
            .map(|d| d.map(date_parser::to_date32))
            .collect::<Date32Array>(),
    )
}

/// `order_year`, `order_month`, `order_year_month`, null where the date is.
pub fn date_parts(dates: &[Option<NaiveDate>]) -> [ArrayRef; 3] {
    let years: Int32Array = dates.iter().map(|d| d.map(|d| d.year())).collect();
    let months: Int32Array = dates.iter().map(|d| d.map(|d| d.month() as i32)).collect();
    let keys: StringArray = dates
        .iter()
        .map(|d| d.map(date_parser::year_month_key))
        .collect();
    [Arc::new(years), Arc::new(months), Arc::new(keys)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int32Type};

    #[test]
    fn kinds_by_name() {
        assert_eq!(ColumnKind::of("order_date"), ColumnKind::Date);
        assert_eq!(ColumnKind::of("profit"), ColumnKind::Float);
        assert_eq!(ColumnKind::of("quantity"), ColumnKind::Int);
        assert_eq!(ColumnKind::of("region"), ColumnKind::Text);
    }

    #[test]
    fn floats_keep_negatives_and_count_failures() {
        let (arr, failed) = float_column(&[Some("1.5"), Some("-2"), None, Some("abc")]);
        let arr = arr.as_primitive::<Float64Type>();
        assert_eq!(arr.value(0), 1.5);
        assert_eq!(arr.value(1), -2.0);
        assert!(arr.is_null(2));
        assert!(arr.is_null(3));
        assert_eq!(failed, 1);
    }

    #[test]
    fn lenient_dates_become_null() {
        let (dates, failed) = parse_dates(
            &[Some("2022-01-05"), Some("not a date"), None],
            "%Y-%m-%d",
            DateParsing::Lenient,
        )
        .unwrap();
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2022, 1, 5));
        assert_eq!(dates[1], None);
        assert_eq!(dates[2], None);
        assert_eq!(failed, 1);

        let [years, months, keys] = date_parts(&dates);
        assert_eq!(years.as_primitive::<Int32Type>().value(0), 2022);
        assert_eq!(months.as_primitive::<Int32Type>().value(0), 1);
        assert_eq!(keys.as_string::<i32>().value(0), "202201");
        assert!(years.is_null(1) && months.is_null(1) && keys.is_null(1));
    }

    #[test]
    fn strict_dates_fail() {
        let err = parse_dates(
            &[Some("2022-01-05"), Some("not a date")],
            "%Y-%m-%d",
            DateParsing::Strict,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    }

    #[test]
    fn strict_dates_allow_missing() {
        let (dates, failed) =
            parse_dates(&[None, Some("2023-12-31")], "%Y-%m-%d", DateParsing::Strict).unwrap();
        assert_eq!(dates, vec![None, NaiveDate::from_ymd_opt(2023, 12, 31)]);
        assert_eq!(failed, 0);
    }
}
