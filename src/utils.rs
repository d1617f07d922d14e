use crate::error::{FilingsError, Result};
use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .ok_or_else(|| {
            FilingsError::DateError(format!("No month end for {:04}-{:02}", year, month))
        })
}

/// Calendar quarter-end date (Mar 31, Jun 30, Sep 30, Dec 31).
pub fn quarter_end_date(year: i32, quarter: u32) -> Result<NaiveDate> {
    if !(1..=4).contains(&quarter) {
        return Err(FilingsError::DateError(format!(
            "Quarter {} out of range 1..=4",
            quarter
        )));
    }
    last_day_of_month(year, quarter * 3)
}

pub fn quarter_of_date(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

/// Formats a period label, e.g. `2023 Q2`.
pub fn period_label(year: i32, quarter: u32) -> String {
    format!("{} Q{}", year, quarter)
}

/// Parses a period label in the format "YYYY QN".
/// Returns (year, quarter)
pub fn parse_period_label(label: &str) -> Result<(i32, u32)> {
    let invalid = || FilingsError::InvalidPeriod(label.to_string());

    let mut parts = label.split_whitespace();
    let year_part = parts.next().ok_or_else(invalid)?;
    let quarter_part = parts.next().ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    let year: i32 = year_part.parse().map_err(|_| invalid())?;
    let quarter: u32 = quarter_part
        .strip_prefix('Q')
        .or_else(|| quarter_part.strip_prefix('q'))
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    if !(1..=4).contains(&quarter) {
        return Err(invalid());
    }

    Ok((year, quarter))
}

/// Percentage change guarded against a non-positive base.
pub fn pct_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

/// Ratio in percent, 0 when the denominator is not positive.
pub fn guarded_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}
