use chrono::{Datelike, Days, Local, NaiveDate};

use crate::error::{Error, Result};

/// `YYYYMMDD` integer key for a calendar date.
pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// Inverse of [`date_key`]; `None` for keys that are not real dates.
pub fn date_from_key(key: i32) -> Option<NaiveDate> {
    if key <= 0 {
        return None;
    }
    let year = key / 10_000;
    let month = (key / 100) % 100;
    let day = key % 100;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Parse a `--date` argument in `YYYY-MM-DD` form.
pub fn parse_process_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| Error::InvalidValue(format!("date '{value}' is not YYYY-MM-DD: {err}")))
}

/// The day before `today`; stages process yesterday's partition by default.
pub fn previous_day(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

/// Resolve an optional `--date` argument against the local clock.
pub fn resolve_process_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(value) => parse_process_date(value),
        None => Ok(previous_day(Local::now().date_naive())),
    }
}
