//! Usage reading persistence.
//!
//! Append-only, idempotent storage: inserting a reading whose natural key
//! already exists is a silent no-op, which is what makes repeated ingestion
//! runs over overlapping date ranges safe. The only mutation ever applied
//! after insert is flipping `published` to true.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::core::models::UsageReading;
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};
use crate::storage::schema::run_migrations;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Usage reading database access layer.
pub struct UsageStore {
    conn: Connection,
}

impl UsageStore {
    /// Create or open the database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| GridwattError::Storage(format!("open database: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| GridwattError::Storage(format!("open in-memory db: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    /// Insert a reading; a natural-key duplicate is a silent no-op.
    ///
    /// Returns whether a row was actually written. Duplicate detection is
    /// the schema's unique indexes, not application logic, so concurrent or
    /// repeated runs stay safe.
    ///
    /// # Errors
    /// Returns an error if the INSERT fails for any reason other than a
    /// duplicate key.
    pub fn insert(&self, reading: &UsageReading) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT OR IGNORE INTO usage_readings \
                    (date, start_time, end_time, kwh, service, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| GridwattError::Storage(format!("prepare insert: {e}")))?;

        stmt.execute(params![
            reading.date.format(DATE_FORMAT).to_string(),
            reading
                .start_time
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            reading
                .end_time
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            reading.kwh,
            reading.service.cli_name(),
            Utc::now().to_rfc3339(),
        ])
        .map_err(|e| GridwattError::Storage(format!("insert reading: {e}")))?;

        Ok(self.conn.changes() > 0)
    }

    /// All readings for a service, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row is undecodable.
    pub fn list_by_service(&self, service: Utility) -> Result<Vec<UsageReading>> {
        self.query_readings(
            "SELECT id, date, start_time, end_time, kwh, service, published \
             FROM usage_readings WHERE service = ?1 \
             ORDER BY date DESC, start_time DESC",
            service,
        )
    }

    /// Readings for a service not yet published, oldest first so the
    /// dashboard receives them in chronological order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row is undecodable.
    pub fn list_unpublished(&self, service: Utility) -> Result<Vec<UsageReading>> {
        self.query_readings(
            "SELECT id, date, start_time, end_time, kwh, service, published \
             FROM usage_readings WHERE service = ?1 AND published = 0 \
             ORDER BY date ASC, start_time ASC",
            service,
        )
    }

    /// Mark a reading as published. Monotonic: nothing ever unsets it.
    ///
    /// # Errors
    /// Returns an error if the UPDATE fails or no such reading exists.
    pub fn mark_published(&self, reading_id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE usage_readings SET published = 1 WHERE id = ?1",
                [reading_id],
            )
            .map_err(|e| GridwattError::Storage(format!("mark published: {e}")))?;

        if changed == 0 {
            return Err(GridwattError::Storage(format!(
                "no reading with id {reading_id}"
            )));
        }
        Ok(())
    }

    fn query_readings(&self, sql: &str, service: Utility) -> Result<Vec<UsageReading>> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| GridwattError::Storage(format!("prepare query: {e}")))?;

        let rows = stmt
            .query_map([service.cli_name()], map_reading)
            .map_err(|e| GridwattError::Storage(format!("query readings: {e}")))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| GridwattError::Storage(format!("read row: {e}")))
    }
}

fn map_reading(row: &Row<'_>) -> rusqlite::Result<UsageReading> {
    let date_text: String = row.get(1)?;
    let start_text: Option<String> = row.get(2)?;
    let end_text: Option<String> = row.get(3)?;
    let service_text: String = row.get(5)?;

    let date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let start_time = start_text
        .map(|t| NaiveDateTime::parse_from_str(&t, TIMESTAMP_FORMAT))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let end_time = end_text
        .map(|t| NaiveDateTime::parse_from_str(&t, TIMESTAMP_FORMAT))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let service = Utility::from_cli_name(&service_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(UsageReading {
        id: row.get(0)?,
        date,
        start_time,
        end_time,
        kwh: row.get(4)?,
        service,
        published: row.get::<_, i64>(6)? != 0,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(date: (i32, u32, u32), hour: u32, kwh: f64, service: Utility) -> UsageReading {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        let start = date.and_hms_opt(hour, 0, 0).unwrap();
        UsageReading::new(
            date,
            Some(start),
            Some(start + chrono::Duration::hours(1)),
            kwh,
            service,
        )
    }

    fn daily(date: (i32, u32, u32), kwh: f64, service: Utility) -> UsageReading {
        UsageReading::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            None,
            None,
            kwh,
            service,
        )
    }

    #[test]
    fn duplicate_interval_insert_is_a_noop() {
        let store = UsageStore::open_in_memory().unwrap();
        let reading = hourly((2024, 3, 1), 13, 1.5, Utility::Coned);

        assert!(store.insert(&reading).unwrap());
        assert!(!store.insert(&reading).unwrap(), "second insert is ignored");

        let stored = store.list_by_service(Utility::Coned).unwrap();
        assert_eq!(stored.len(), 1);
        assert!((stored[0].kwh - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_daily_insert_is_a_noop() {
        let store = UsageStore::open_in_memory().unwrap();
        let reading = daily((2024, 3, 1), 12.0, Utility::Nyseg);

        assert!(store.insert(&reading).unwrap());
        assert!(!store.insert(&reading).unwrap());
        assert_eq!(store.list_by_service(Utility::Nyseg).unwrap().len(), 1);
    }

    #[test]
    fn same_key_different_service_both_stored() {
        let store = UsageStore::open_in_memory().unwrap();
        assert!(store.insert(&hourly((2024, 3, 1), 13, 1.0, Utility::Coned)).unwrap());
        assert!(store.insert(&hourly((2024, 3, 1), 13, 2.0, Utility::Nyseg)).unwrap());

        assert_eq!(store.list_by_service(Utility::Coned).unwrap().len(), 1);
        assert_eq!(store.list_by_service(Utility::Nyseg).unwrap().len(), 1);
    }

    #[test]
    fn readings_roundtrip_fields() {
        let store = UsageStore::open_in_memory().unwrap();
        let reading = hourly((2024, 3, 1), 7, 0.75, Utility::Coned);
        store.insert(&reading).unwrap();

        let stored = &store.list_by_service(Utility::Coned).unwrap()[0];
        assert_eq!(stored.date, reading.date);
        assert_eq!(stored.start_time, reading.start_time);
        assert_eq!(stored.end_time, reading.end_time);
        assert_eq!(stored.service, Utility::Coned);
        assert!(!stored.published);
        assert!(stored.id > 0);
    }

    #[test]
    fn mark_published_is_monotonic_and_filters_listing() {
        let store = UsageStore::open_in_memory().unwrap();
        store.insert(&hourly((2024, 3, 1), 0, 1.0, Utility::Coned)).unwrap();
        store.insert(&hourly((2024, 3, 1), 1, 2.0, Utility::Coned)).unwrap();

        let unpublished = store.list_unpublished(Utility::Coned).unwrap();
        assert_eq!(unpublished.len(), 2);

        store.mark_published(unpublished[0].id).unwrap();
        // Marking twice is fine; the flag only ever moves one way.
        store.mark_published(unpublished[0].id).unwrap();

        let remaining = store.list_unpublished(Utility::Coned).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, unpublished[1].id);

        let all = store.list_by_service(Utility::Coned).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn mark_published_unknown_id_errors() {
        let store = UsageStore::open_in_memory().unwrap();
        assert!(store.mark_published(9999).is_err());
    }

    #[test]
    fn unpublished_listing_is_chronological() {
        let store = UsageStore::open_in_memory().unwrap();
        store.insert(&hourly((2024, 3, 2), 5, 1.0, Utility::Coned)).unwrap();
        store.insert(&hourly((2024, 3, 1), 9, 1.0, Utility::Coned)).unwrap();
        store.insert(&hourly((2024, 3, 1), 3, 1.0, Utility::Coned)).unwrap();

        let unpublished = store.list_unpublished(Utility::Coned).unwrap();
        let starts: Vec<_> = unpublished.iter().map(|r| r.start_time.unwrap()).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }
}
