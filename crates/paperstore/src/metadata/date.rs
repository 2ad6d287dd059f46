//! Permissive normalization of partial publication dates.
//!
//! Accepted shapes (after en/em dashes, `/` and `.` become `-`):
//!
//! | input        | result       |
//! |--------------|--------------|
//! | `YYYY`       | `YYYY-01-01` |
//! | `YYYY-MM`    | `YYYY-MM-01` |
//! | `MM-YYYY`    | `YYYY-MM-01` |
//! | `YYYY-MM-DD` | as given     |
//! | `DD-MM-YYYY` | `YYYY-MM-DD` |
//!
//! A three-token date whose year comes last is always read day-first, so
//! the US `MM-DD-YYYY` order is folded into `DD-MM-YYYY`: `03-04-2023`
//! becomes 3 April, not 4 March. Timestamps such as
//! `2023-03-15T10:00:00Z` are reduced to their date part.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("empty date")]
    Empty,

    #[error("non-numeric date component '{0}'")]
    NotNumeric(String),

    #[error("unrecognized date layout '{0}'")]
    UnrecognizedLayout(String),

    #[error("no such calendar date: {year:04}-{month:02}-{day:02}")]
    OutOfRange { year: i32, month: u32, day: u32 },
}

/// Normalizes a free-form, possibly partial date string.
pub fn normalize_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let unified: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '/' | '.' => '-',
            other => other,
        })
        .collect();
    let date_part = strip_time(&unified);
    if date_part.is_empty() {
        return Err(DateParseError::Empty);
    }

    let tokens: Vec<&str> = date_part.split('-').map(str::trim).collect();
    let numbers = tokens
        .iter()
        .map(|t| parse_component(t))
        .collect::<Result<Vec<u32>, _>>()?;

    let (year, month, day) = match numbers.as_slice() {
        [year] => (*year, 1, 1),
        [first, second] if *first > 31 => (*first, *second, 1),
        [first, second] => (*second, *first, 1),
        [first, second, third] if *first > 31 => (*first, *second, *third),
        [first, second, third] if *third > 31 => (*third, *second, *first),
        _ => return Err(DateParseError::UnrecognizedLayout(raw.trim().to_string())),
    };

    let year = i32::try_from(year)
        .map_err(|_| DateParseError::UnrecognizedLayout(raw.trim().to_string()))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(DateParseError::OutOfRange { year, month, day })
}

/// Drops a trailing `T...` or ` ...` time component after a leading
/// `YYYY-MM-DD`.
fn strip_time(value: &str) -> &str {
    match value.find(|c: char| c == 'T' || c == ' ') {
        Some(idx) if idx == 10 => &value[..idx],
        _ => value,
    }
}

fn parse_component(token: &str) -> Result<u32, DateParseError> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) || token.len() > 9 {
        return Err(DateParseError::NotNumeric(token.to_string()));
    }
    token
        .parse::<u32>()
        .map_err(|_| DateParseError::NotNumeric(token.to_string()))
}
