//! Tabular extraction of export payloads.
//!
//! The portals ship delimited text whose column names and ordering drift
//! over time, so columns are located by case-insensitive substring matching
//! against a small vocabulary instead of fixed positions. Missing date or
//! usage columns fail the batch; anything wrong with an individual row just
//! skips that row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::core::models::RawReading;
use crate::error::{GridwattError, Result};

// =============================================================================
// Column discovery
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    usage: usize,
    start: Option<usize>,
    end: Option<usize>,
}

fn discover_columns(header: &StringRecord) -> Result<Columns> {
    let mut date = None;
    let mut usage = None;
    let mut start = None;
    let mut end = None;

    for (i, cell) in header.iter().enumerate() {
        let lower = cell.trim().to_lowercase();
        if lower.contains("date") && !lower.contains("time") {
            date = Some(i);
        } else if lower.contains("start time") {
            start = Some(i);
        } else if lower.contains("end time") {
            end = Some(i);
        } else if lower.contains("usage") {
            usage = Some(i);
        }
    }

    match (date, usage) {
        (Some(date), Some(usage)) => Ok(Columns {
            date,
            usage,
            start,
            end,
        }),
        _ => Err(GridwattError::MissingColumns {
            header: header.iter().collect::<Vec<_>>().join(","),
        }),
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Parsed payload plus what granularity the source natively carries.
#[derive(Debug)]
pub struct Extraction {
    pub readings: Vec<RawReading>,
    /// Whether the payload had a start-time column at all. Sources without
    /// one are daily-granularity and get collapsed before aggregation.
    pub has_interval_times: bool,
}

/// Parse a delimited-text payload into raw readings.
///
/// Rows with an unparsable date, or an unparsable or zero usage value, are
/// skipped silently — a handful of malformed rows must not fail the batch.
///
/// # Errors
///
/// Returns [`GridwattError::MissingColumns`] when the header lacks a date or
/// usage column, and [`GridwattError::ParsePayload`] when the payload is not
/// decodable as delimited text at all.
pub fn parse_readings(raw: &[u8]) -> Result<Extraction> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw);

    let header = reader
        .headers()
        .map_err(|e| GridwattError::ParsePayload(e.to_string()))?
        .clone();
    let columns = discover_columns(&header)?;

    let mut readings = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else {
            continue;
        };
        if let Some(reading) = parse_row(&record, columns) {
            readings.push(reading);
        }
    }

    tracing::debug!(rows = readings.len(), "extracted readings from payload");
    Ok(Extraction {
        readings,
        has_interval_times: columns.start.is_some(),
    })
}

fn parse_row(record: &StringRecord, columns: Columns) -> Option<RawReading> {
    let date_text = record.get(columns.date)?.trim();
    if date_text.is_empty() {
        return None;
    }
    let date = parse_date(date_text)?;

    let kwh = parse_kwh(record.get(columns.usage)?)?;
    if kwh == 0.0 {
        return None;
    }

    let start_text = columns
        .start
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);
    let start = start_text.as_deref().and_then(parse_timestamp);
    let end = columns
        .end
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_timestamp);

    Some(RawReading {
        date,
        start_text,
        start,
        end,
        kwh,
    })
}

/// Sum same-date rows into one daily reading, for sources whose rows carry
/// no timestamp granularity finer than a day.
#[must_use]
pub fn collapse_daily(readings: Vec<RawReading>) -> Vec<RawReading> {
    let mut daily: Vec<RawReading> = Vec::new();
    for reading in readings {
        if let Some(existing) = daily.iter_mut().find(|r| r.date == reading.date) {
            existing.kwh += reading.kwh;
        } else {
            daily.push(RawReading {
                start_text: None,
                start: None,
                end: None,
                ..reading
            });
        }
    }
    daily
}

// =============================================================================
// Field parsing
// =============================================================================

/// Datetime formats carrying a UTC offset.
const DATETIME_TZ_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"];

/// Naive datetime formats.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Date-only formats, in the order the portals have been seen to use them.
/// The two-digit-year form must come before the four-digit one: `%Y`
/// happily accepts "24" as the year 24.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y"];

/// Parse a timestamp cell, trying each recognized format in order.
/// Date-only values resolve to midnight.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for format in DATETIME_TZ_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.naive_local());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Parse a date cell; timestamp values resolve to their calendar date.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_timestamp(s).map(|dt| dt.date())
}

/// Parse a kWh cell: strip thousands separators, inner whitespace, and a
/// trailing unit suffix before numeric conversion.
fn parse_kwh(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace([',', ' '], "").to_lowercase();
    let cleaned = cleaned.strip_suffix("kwh").unwrap_or(&cleaned).trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

// =============================================================================
// Tests
// =============================================================================
