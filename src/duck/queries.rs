use arrow::{
    array::{Array, ArrayRef, AsArray, PrimitiveArray, StringArray},
    compute::cast,
    datatypes::{ArrowPrimitiveType, DataType, Float64Type, Int32Type, Int64Type},
    record_batch::RecordBatch,
    util::pretty::pretty_format_batches,
};
use duckdb::Statement;
use serde::Serialize;
use std::{fmt, str::FromStr};
use tracing::{debug, instrument};

use super::{quote_identifier, Store};
use crate::error::{Error, Result};

/// How many products [`Query::TopProducts`] returns.
pub const TOP_PRODUCTS: usize = 10;
/// How many products per region [`Query::TopProductsPerRegion`] returns.
pub const TOP_PER_REGION: usize = 5;
/// The two calendar years the comparison queries look at.
pub const FIRST_YEAR: i32 = 2022;
pub const SECOND_YEAR: i32 = 2023;

/// The fixed analytics catalog. Every variant is a read-only query over the
/// loaded orders table and takes no parameters beyond the table name.
///
/// Ties are broken deterministically: by `product_id`, `order_year_month`
/// or `sub_category` ascending, whichever is the grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    TopProducts,
    TopProductsPerRegion,
    MonthOverMonth,
    BestMonthPerCategory,
    TopSubCategoryGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub product_id: Option<String>,
    pub total_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionProductSales {
    pub region: Option<String>,
    pub product_id: Option<String>,
    pub total_sales: f64,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthComparison {
    pub month: i32,
    pub sales_2022: f64,
    pub sales_2023: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBestMonth {
    pub category: Option<String>,
    pub order_year_month: String,
    pub total_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCategoryGrowth {
    pub sub_category: Option<String>,
    pub sales_2022: f64,
    pub sales_2023: f64,
    pub growth: f64,
}

/// Typed rows of one catalog query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    TopProducts(Vec<ProductSales>),
    TopProductsPerRegion(Vec<RegionProductSales>),
    MonthOverMonth(Vec<MonthComparison>),
    BestMonthPerCategory(Vec<CategoryBestMonth>),
    TopSubCategoryGrowth(Vec<SubCategoryGrowth>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::TopProducts(r) => r.len(),
            QueryResult::TopProductsPerRegion(r) => r.len(),
            QueryResult::MonthOverMonth(r) => r.len(),
            QueryResult::BestMonthPerCategory(r) => r.len(),
            QueryResult::TopSubCategoryGrowth(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Query {
    pub const ALL: [Query; 5] = [
        Query::TopProducts,
        Query::TopProductsPerRegion,
        Query::MonthOverMonth,
        Query::BestMonthPerCategory,
        Query::TopSubCategoryGrowth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Query::TopProducts => "top-products",
            Query::TopProductsPerRegion => "top-products-per-region",
            Query::MonthOverMonth => "month-over-month",
            Query::BestMonthPerCategory => "best-month-per-category",
            Query::TopSubCategoryGrowth => "top-sub-category-growth",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Query::TopProducts => "Top 10 products by total sales",
            Query::TopProductsPerRegion => "Top 5 products in each region by total sales",
            Query::MonthOverMonth => "Monthly total sales, 2022 vs 2023",
            Query::BestMonthPerCategory => "Highest-selling month for each category",
            Query::TopSubCategoryGrowth => "Sub-category with the largest 2022 to 2023 sales growth",
        }
    }

    pub fn sql(self, table: &str) -> Result<String> {
        let t = quote_identifier(table)?;
        let (y1, y2) = (FIRST_YEAR, SECOND_YEAR);
        Ok(match self {
            Query::TopProducts => format!(
                "SELECT product_id, COALESCE(SUM(sale_price), 0) AS total_sales
FROM {t}
GROUP BY product_id
ORDER BY total_sales DESC, product_id
LIMIT {TOP_PRODUCTS}"
            ),
            Query::TopProductsPerRegion => format!(
                "WITH totals AS (
    SELECT region, product_id, COALESCE(SUM(sale_price), 0) AS total_sales
    FROM {t}
    GROUP BY region, product_id
), ranked AS (
    SELECT region, product_id, total_sales,
           ROW_NUMBER() OVER (PARTITION BY region ORDER BY total_sales DESC, product_id) AS sales_rank
    FROM totals
)
SELECT region, product_id, total_sales, sales_rank
FROM ranked
WHERE sales_rank <= {TOP_PER_REGION}
ORDER BY region, sales_rank"
            ),
            Query::MonthOverMonth => format!(
                "SELECT order_month AS month,
       COALESCE(SUM(CASE WHEN order_year = {y1} THEN sale_price END), 0) AS sales_{y1},
       COALESCE(SUM(CASE WHEN order_year = {y2} THEN sale_price END), 0) AS sales_{y2}
FROM {t}
WHERE order_year IN ({y1}, {y2})
GROUP BY order_month
ORDER BY order_month"
            ),
            Query::BestMonthPerCategory => format!(
                "WITH monthly AS (
    SELECT category, order_year_month, COALESCE(SUM(sale_price), 0) AS total_sales
    FROM {t}
    WHERE order_year_month IS NOT NULL
    GROUP BY category, order_year_month
), ranked AS (
    SELECT category, order_year_month, total_sales,
           ROW_NUMBER() OVER (PARTITION BY category ORDER BY total_sales DESC, order_year_month) AS rn
    FROM monthly
)
SELECT category, order_year_month, total_sales
FROM ranked
WHERE rn = 1
ORDER BY category"
            ),
            Query::TopSubCategoryGrowth => format!(
                "WITH yearly AS (
    SELECT sub_category,
           COALESCE(SUM(CASE WHEN order_year = {y1} THEN sale_price END), 0) AS sales_{y1},
           COALESCE(SUM(CASE WHEN order_year = {y2} THEN sale_price END), 0) AS sales_{y2}
    FROM {t}
    WHERE order_year IN ({y1}, {y2})
    GROUP BY sub_category
)
SELECT sub_category, sales_{y1}, sales_{y2}, sales_{y2} - sales_{y1} AS growth
FROM yearly
ORDER BY growth DESC, sub_category
LIMIT 1"
            ),
        })
    }

    fn prepare<'s>(self, store: &'s Store, table: &str) -> Result<Statement<'s>> {
        let sql = self.sql(table)?;
        debug!(query = self.name(), %sql, "preparing");
        store
            .connection()
            .prepare(&sql)
            .map_err(|source| self.error(source))
    }

    fn error(self, source: duckdb::Error) -> Error {
        Error::Query {
            query: self.name(),
            source,
        }
    }

    /// Execute against `table`, keeping the result as Arrow batches.
    #[instrument(level = "info", skip(self, store), fields(query = self.name()))]
    pub fn batches(self, store: &Store, table: &str) -> Result<Vec<RecordBatch>> {
        let mut stmt = self.prepare(store, table)?;
        let batches: Vec<RecordBatch> = stmt
            .query_arrow([])
            .map_err(|source| self.error(source))?
            .collect();
        debug!(rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(), "query finished");
        Ok(batches)
    }

    /// Typed rows of this query's result batches.
    pub fn rows(self, batches: &[RecordBatch]) -> Result<QueryResult> {
        let mut result = match self {
            Query::TopProducts => QueryResult::TopProducts(Vec::new()),
            Query::TopProductsPerRegion => QueryResult::TopProductsPerRegion(Vec::new()),
            Query::MonthOverMonth => QueryResult::MonthOverMonth(Vec::new()),
            Query::BestMonthPerCategory => QueryResult::BestMonthPerCategory(Vec::new()),
            Query::TopSubCategoryGrowth => QueryResult::TopSubCategoryGrowth(Vec::new()),
        };
        for batch in batches {
            let n = batch.num_rows();
            match &mut result {
                QueryResult::TopProducts(out) => {
                    let ids = text(batch, 0)?;
                    let totals = primitive::<Float64Type>(batch, 1)?;
                    out.extend((0..n).map(|r| ProductSales {
                        product_id: opt_text(&ids, r),
                        total_sales: totals.value(r),
                    }));
                }
                QueryResult::TopProductsPerRegion(out) => {
                    let regions = text(batch, 0)?;
                    let ids = text(batch, 1)?;
                    let totals = primitive::<Float64Type>(batch, 2)?;
                    let ranks = primitive::<Int64Type>(batch, 3)?;
                    out.extend((0..n).map(|r| RegionProductSales {
                        region: opt_text(&regions, r),
                        product_id: opt_text(&ids, r),
                        total_sales: totals.value(r),
                        rank: ranks.value(r),
                    }));
                }
                QueryResult::MonthOverMonth(out) => {
                    let months = primitive::<Int32Type>(batch, 0)?;
                    let first = primitive::<Float64Type>(batch, 1)?;
                    let second = primitive::<Float64Type>(batch, 2)?;
                    out.extend((0..n).map(|r| MonthComparison {
                        month: months.value(r),
                        sales_2022: first.value(r),
                        sales_2023: second.value(r),
                    }));
                }
                QueryResult::BestMonthPerCategory(out) => {
                    let categories = text(batch, 0)?;
                    let keys = text(batch, 1)?;
                    let totals = primitive::<Float64Type>(batch, 2)?;
                    out.extend((0..n).map(|r| CategoryBestMonth {
                        category: opt_text(&categories, r),
                        order_year_month: keys.value(r).to_string(),
                        total_sales: totals.value(r),
                    }));
                }
                QueryResult::TopSubCategoryGrowth(out) => {
                    let subs = text(batch, 0)?;
                    let first = primitive::<Float64Type>(batch, 1)?;
                    let second = primitive::<Float64Type>(batch, 2)?;
                    let growth = primitive::<Float64Type>(batch, 3)?;
                    out.extend((0..n).map(|r| SubCategoryGrowth {
                        sub_category: opt_text(&subs, r),
                        sales_2022: first.value(r),
                        sales_2023: second.value(r),
                        growth: growth.value(r),
                    }));
                }
            }
        }
        Ok(result)
    }

    /// Execute against `table` and map the rows to their typed form.
    pub fn run(self, store: &Store, table: &str) -> Result<QueryResult> {
        self.rows(&self.batches(store, table)?)
    }

    /// Result rendered as a text table.
    pub fn render(self, store: &Store, table: &str) -> Result<String> {
        format_batches(&self.batches(store, table)?)
    }
}

/// Query batches as a text table.
pub fn format_batches(batches: &[RecordBatch]) -> Result<String> {
    Ok(pretty_format_batches(batches)?.to_string())
}

fn column(batch: &RecordBatch, i: usize) -> Result<&ArrayRef> {
    batch.columns().get(i).ok_or_else(|| {
        Error::Schema(format!(
            "query result has {} columns, expected at least {}",
            batch.num_columns(),
            i + 1
        ))
    })
}

fn text(batch: &RecordBatch, i: usize) -> Result<StringArray> {
    Ok(cast(column(batch, i)?, &DataType::Utf8)?
        .as_string::<i32>()
        .clone())
}

fn primitive<T: ArrowPrimitiveType>(batch: &RecordBatch, i: usize) -> Result<PrimitiveArray<T>> {
    Ok(cast(column(batch, i)?, &T::DATA_TYPE)?
        .as_primitive::<T>()
        .clone())
}

fn opt_text(array: &StringArray, row: usize) -> Option<String> {
    array.is_valid(row).then(|| array.value(row).to_string())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Query::ALL
            .into_iter()
            .find(|q| q.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Query::ALL.iter().map(|q| q.name()).collect();
                Error::Config(format!("unknown query `{s}`; expected one of {}", known.join(", ")))
            })
    }
}
