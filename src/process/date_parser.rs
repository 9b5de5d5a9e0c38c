use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// `num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Parse `s` with the chrono `format`. A datetime matching the format is
/// accepted and truncated to its date.
pub fn parse_order_date(s: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, format)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, format).ok().map(|dt| dt.date()))
}

/// Days since 1970-01-01, the Arrow `Date32` representation.
pub fn to_date32(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn from_date32(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// `YYYYMM` bucket key.
pub fn year_month_key(d: NaiveDate) -> String {
    format!("{:04}{:02}", d.year(), d.month())
}
