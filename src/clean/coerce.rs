//! Field-level coercions.
//!
//! Every function here is total: malformed or missing input yields `None`,
//! never an error. Callers count failures by comparing present inputs with
//! absent outputs.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Characters stripped from price strings before parsing.
const PRICE_FORMATTING: &[char] = &['$', ','];

/// Calendar formats tried in order by [`parse_date`].
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Largest integer an f64 represents exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Parse a currency-formatted price such as `"$1,234.50"`.
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
    let stripped: String = raw?.chars().filter(|c| !PRICE_FORMATTING.contains(c)).collect();
    parse_float(Some(&stripped))
}

/// Parse a finite floating-point number.
pub fn parse_float(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Parse an integer count. `"3.0"` is accepted; `"2.5"` is not.
pub fn parse_integer(raw: Option<&str>) -> Option<i64> {
    let text = raw?.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    let value = parse_float(Some(text))?;
    (value.fract() == 0.0 && value.abs() <= MAX_EXACT_FLOAT_INT).then_some(value as i64)
}

/// Leniently parse a calendar date, dropping any time of day.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
