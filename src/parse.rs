//! Line parser for station record files.
//!
//! Each line is whitespace delimited: `YYYYMMDD max_temp min_temp precip`, all
//! three values integer tenths. Extra trailing fields are ignored. Parsing never
//! panics; every bad line comes back as a [`ParseError`] for the caller to count.

use chrono::NaiveDate;
use thiserror::Error;

use crate::convert::{precip_cm_from_tenths_mm, temp_from_tenths, DEFAULT_MISSING_SENTINEL};
use crate::Reading;

// ---

/// Column positions and missing-value sentinel of the input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub date: usize,
    pub max_temp: usize,
    pub min_temp: usize,
    pub precip: usize,
    pub missing_sentinel: i64,
}

impl Default for RecordLayout {
    fn default() -> Self {
        RecordLayout {
            date: 0,
            max_temp: 1,
            min_temp: 2,
            precip: 3,
            missing_sentinel: DEFAULT_MISSING_SENTINEL,
        }
    }
}

impl RecordLayout {
    pub fn with_sentinel(missing_sentinel: i64) -> Self {
        RecordLayout {
            missing_sentinel,
            ..Default::default()
        }
    }

    fn required_fields(&self) -> usize {
        [self.date, self.max_temp, self.min_temp, self.precip]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("malformed date '{0}'")]
    MalformedDate(String),

    #[error("expected at least {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("non-numeric {field} '{value}'")]
    NonNumeric { field: &'static str, value: String },
}

/// A single rejected line, with enough context to log it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_number}: {kind} in '{raw}'")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line_number: u64,
    pub raw: String,
}

/// Parse one raw line belonging to `station_id`.
///
/// `line_number` is 1-based and only used for error context.
pub fn parse_line(
    station_id: &str,
    raw: &str,
    line_number: u64,
    layout: &RecordLayout,
) -> Result<Reading, ParseError> {
    // ---
    let fail = |kind| ParseError {
        kind,
        line_number,
        raw: raw.trim_end().to_string(),
    };

    let fields: Vec<&str> = raw.split_whitespace().collect();
    let expected = layout.required_fields();
    if fields.len() < expected {
        return Err(fail(ParseErrorKind::FieldCount {
            expected,
            found: fields.len(),
        }));
    }

    let date_str = fields[layout.date];
    let date = parse_date(date_str)
        .ok_or_else(|| fail(ParseErrorKind::MalformedDate(date_str.to_string())))?;

    let number = |field: &'static str, idx: usize| {
        let value = fields[idx];
        value.parse::<i64>().map_err(|_| {
            fail(ParseErrorKind::NonNumeric {
                field,
                value: value.to_string(),
            })
        })
    };

    let max_raw = number("max_temp", layout.max_temp)?;
    let min_raw = number("min_temp", layout.min_temp)?;
    let precip_raw = number("precipitation", layout.precip)?;

    let sentinel = layout.missing_sentinel;
    Ok(Reading {
        station_id: station_id.to_string(),
        date,
        max_temp_c: temp_from_tenths(Some(max_raw), sentinel),
        min_temp_c: temp_from_tenths(Some(min_raw), sentinel),
        precip_cm: precip_cm_from_tenths_mm(Some(precip_raw), sentinel),
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}
