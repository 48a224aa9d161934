//! Reduction of raw readings to stored hourly records.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::core::models::{RawReading, UsageReading};
use crate::core::utility::Utility;

/// How a utility's export rows map onto stored readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Rows are already at the stored granularity; pass through unchanged.
    Identity,
    /// Sub-hourly rows are summed per (date, clock hour).
    HourlySum,
}

/// Reduce raw readings to usage readings under the given strategy.
///
/// Output ordering is not significant; persistence is keyed.
#[must_use]
pub fn aggregate(
    readings: Vec<RawReading>,
    strategy: AggregationStrategy,
    service: Utility,
) -> Vec<UsageReading> {
    match strategy {
        AggregationStrategy::Identity => identity(readings, service),
        AggregationStrategy::HourlySum => hourly_sum(readings, service),
    }
}

fn identity(readings: Vec<RawReading>, service: Utility) -> Vec<UsageReading> {
    readings
        .into_iter()
        .map(|r| UsageReading::new(r.date, r.start, r.end, r.kwh, service))
        .collect()
}

/// Sum sub-hourly rows into one reading per (date, hour) bucket.
///
/// The hour comes from the first two characters of the row's start-time
/// label — the feed emits bare `HH:MM` wall-clock strings. Rows whose label
/// has no two-digit hour prefix are dropped.
fn hourly_sum(readings: Vec<RawReading>, service: Utility) -> Vec<UsageReading> {
    let mut buckets: BTreeMap<(NaiveDate, u32), f64> = BTreeMap::new();

    for reading in readings {
        let Some(hour) = reading.start_text.as_deref().and_then(hour_prefix) else {
            continue;
        };
        *buckets.entry((reading.date, hour)).or_insert(0.0) += reading.kwh;
    }

    buckets
        .into_iter()
        .filter_map(|((date, hour), kwh)| {
            let start = date.and_hms_opt(hour, 0, 0)?;
            Some(UsageReading::new(
                date,
                Some(start),
                Some(start + Duration::hours(1)),
                kwh,
                service,
            ))
        })
        .collect()
}

fn hour_prefix(label: &str) -> Option<u32> {
    label
        .get(..2)?
        .parse::<u32>()
        .ok()
        .filter(|hour| *hour < 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(date: (i32, u32, u32), start_text: &str, kwh: f64) -> RawReading {
        RawReading {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            start_text: Some(start_text.to_string()),
            start: None,
            end: None,
            kwh,
        }
    }

    #[test]
    fn same_bucket_readings_sum_to_one_reading() {
        let readings = vec![
            raw((2024, 3, 1), "00:00", 0.25),
            raw((2024, 3, 1), "00:15", 0.30),
            raw((2024, 3, 1), "00:30", 0.20),
            raw((2024, 3, 1), "00:45", 0.25),
        ];
        let out = aggregate(readings, AggregationStrategy::HourlySum, Utility::Coned);

        assert_eq!(out.len(), 1);
        let reading = &out[0];
        assert!((reading.kwh - 1.0).abs() < 1e-9);
        assert_eq!(
            reading.start_time.unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(
            reading.end_time.unwrap() - reading.start_time.unwrap(),
            Duration::hours(1)
        );
    }

    #[test]
    fn distinct_hours_get_distinct_buckets() {
        let readings = vec![
            raw((2024, 3, 1), "00:45", 0.5),
            raw((2024, 3, 1), "01:00", 0.7),
            raw((2024, 3, 2), "00:00", 0.9),
        ];
        let out = aggregate(readings, AggregationStrategy::HourlySum, Utility::Coned);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn rows_without_hour_prefix_are_dropped() {
        let readings = vec![
            raw((2024, 3, 1), "x", 0.5),
            raw((2024, 3, 1), "99:00", 0.5),
            RawReading {
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                start_text: None,
                start: None,
                end: None,
                kwh: 0.5,
            },
            raw((2024, 3, 1), "23:45", 0.5),
        ];
        let out = aggregate(readings, AggregationStrategy::HourlySum, Utility::Coned);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_time.unwrap().format("%H").to_string(), "23");
    }

    #[test]
    fn identity_keeps_rows_unchanged() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let start = date.and_hms_opt(13, 0, 0).unwrap();
        let readings = vec![RawReading {
            date,
            start_text: Some("2024-03-01 13:00:00".to_string()),
            start: Some(start),
            end: Some(start + Duration::hours(1)),
            kwh: 2.5,
        }];
        let out = aggregate(readings, AggregationStrategy::Identity, Utility::Nyseg);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start_time, Some(start));
        assert!((out[0].kwh - 2.5).abs() < f64::EPSILON);
        assert_eq!(out[0].service, Utility::Nyseg);
        assert!(!out[0].published);
    }
}
