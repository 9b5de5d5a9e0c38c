use arrow::{
    array::{Array, ArrayRef, AsArray, PrimitiveArray, StringArray},
    datatypes::{ArrowPrimitiveType, Date32Type, Float64Type, Int32Type, Int64Type, SchemaRef},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::process::date_parser;

/// One line item, read back out of an [`OrdersTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_id: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub product_id: Option<String>,
    pub sales: Option<f64>,
    pub sale_price: Option<f64>,
    pub discount: Option<f64>,
    pub profit: Option<f64>,
    pub quantity: Option<i64>,
    pub order_year: Option<i32>,
    pub order_month: Option<i32>,
    pub order_year_month: Option<String>,
}

/// The transformed orders, held as a single Arrow batch.
///
/// Always carries `sale_price`, `order_date` and the derived date columns.
#[derive(Debug, Clone)]
pub struct OrdersTable {
    batch: RecordBatch,
}

impl OrdersTable {
    pub fn new(batch: RecordBatch) -> Result<Self> {
        for required in ["sale_price", "order_date", "order_year", "order_month", "order_year_month"] {
            if batch.column_by_name(required).is_none() {
                return Err(Error::Schema(format!("transformed table lacks `{required}`")));
            }
        }
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    fn text(&self, name: &str) -> Option<&StringArray> {
        self.column(name).and_then(|c| c.as_string_opt::<i32>())
    }

    fn primitive<T: ArrowPrimitiveType>(&self, name: &str) -> Option<&PrimitiveArray<T>> {
        self.column(name).and_then(|c| c.as_primitive_opt::<T>())
    }

    /// Typed view of every row. Columns absent from the source read as null.
    pub fn records(&self) -> Vec<OrderRecord> {
        let order_id = self.text("order_id");
        let region = self.text("region");
        let category = self.text("category");
        let sub_category = self.text("sub_category");
        let product_id = self.text("product_id");
        let order_year_month = self.text("order_year_month");
        let order_date = self.primitive::<Date32Type>("order_date");
        let sales = self.primitive::<Float64Type>("sales");
        let sale_price = self.primitive::<Float64Type>("sale_price");
        let discount = self.primitive::<Float64Type>("discount");
        let profit = self.primitive::<Float64Type>("profit");
        let quantity = self.primitive::<Int64Type>("quantity");
        let order_year = self.primitive::<Int32Type>("order_year");
        let order_month = self.primitive::<Int32Type>("order_month");

        (0..self.num_rows())
            .map(|row| OrderRecord {
                order_id: text_at(order_id, row),
                order_date: value_at(order_date, row).and_then(date_parser::from_date32),
                region: text_at(region, row),
                category: text_at(category, row),
                sub_category: text_at(sub_category, row),
                product_id: text_at(product_id, row),
                sales: value_at(sales, row),
                sale_price: value_at(sale_price, row),
                discount: value_at(discount, row),
                profit: value_at(profit, row),
                quantity: value_at(quantity, row),
                order_year: value_at(order_year, row),
                order_month: value_at(order_month, row),
                order_year_month: text_at(order_year_month, row),
            })
            .collect()
    }
}

fn text_at(arr: Option<&StringArray>, row: usize) -> Option<String> {
    arr.filter(|a| a.is_valid(row)).map(|a| a.value(row).to_string())
}

fn value_at<T: ArrowPrimitiveType>(arr: Option<&PrimitiveArray<T>>, row: usize) -> Option<T::Native> {
    arr.filter(|a| a.is_valid(row)).map(|a| a.value(row))
}
