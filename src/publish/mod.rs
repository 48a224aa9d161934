//! Publishing readings to the Home Assistant energy dashboard.
//!
//! Readings go one at a time to an AppDaemon backfill endpoint; after a
//! batch, a second endpoint compiles the backfilled states into long-term
//! statistics (and optionally cost statistics from a $/kWh rate).

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::http;
use crate::core::models::UsageReading;
use crate::error::{GridwattError, Result};
use crate::storage::config::DashboardConfig;

/// State timestamps use the reading's start time; daily readings fall back
/// to midnight of their date.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One backfilled state, as the dashboard's backfill endpoint accepts it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackfillPayload {
    pub entity_id: String,
    pub state: String,
    pub last_changed: String,
    pub last_updated: String,
}

impl BackfillPayload {
    /// Build the payload for one reading.
    #[must_use]
    pub fn for_reading(entity_id: &str, reading: &UsageReading) -> Self {
        let timestamp = reading.start_time.map_or_else(
            || {
                reading
                    .date
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is valid")
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            },
            |start| start.format(TIMESTAMP_FORMAT).to_string(),
        );

        Self {
            entity_id: entity_id.to_string(),
            state: format!("{:.2}", reading.kwh),
            last_changed: timestamp.clone(),
            last_updated: timestamp,
        }
    }
}

/// Outcome of a statistics-compilation call.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StatsSummary {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub total_hours: u64,
}

/// Outcome of a cost-statistics call.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CostSummary {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub rate_used: f64,
}

/// HTTP client for one dashboard endpoint.
#[derive(Debug)]
pub struct Publisher {
    http: Client,
    base_url: String,
    token: String,
    entity_id: String,
    rate: Option<f64>,
}

impl Publisher {
    /// Build a publisher from dashboard config.
    ///
    /// # Errors
    /// Returns a configuration error when url, token, or entity id are
    /// missing.
    pub fn new(config: &DashboardConfig) -> Result<Self> {
        if config.url.is_empty() || config.token.is_empty() || config.entity_id.is_empty() {
            return Err(GridwattError::Config(
                "dashboard config requires url, token, and entity_id".to_string(),
            ));
        }

        Ok(Self {
            http: http::default_client()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            entity_id: config.entity_id.clone(),
            rate: config.rate,
        })
    }

    async fn post<T: for<'de> Deserialize<'de> + Default>(
        &self,
        path: &str,
        payload: &impl Serialize,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(payload)
            .send()
            .await
            .map_err(|e| http::classify_request_error(&e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GridwattError::PublishFailed {
                status: status.as_u16(),
                body,
            });
        }

        // Some endpoints answer with an empty body; treat that as defaults.
        Ok(response.json().await.unwrap_or_default())
    }

    /// Send one reading to the backfill endpoint.
    ///
    /// # Errors
    /// Returns [`GridwattError::PublishFailed`] on any non-200 response.
    pub async fn publish(&self, reading: &UsageReading) -> Result<()> {
        let payload = BackfillPayload::for_reading(&self.entity_id, reading);
        tracing::debug!(
            entity = %payload.entity_id,
            state = %payload.state,
            at = %payload.last_changed,
            "publishing reading"
        );
        self.post::<serde_json::Value>("/api/appdaemon/backfill_state", &payload)
            .await?;
        Ok(())
    }

    /// Compile statistics from the backfilled states.
    ///
    /// # Errors
    /// Returns [`GridwattError::PublishFailed`] on any non-200 response.
    pub async fn generate_statistics(&self) -> Result<StatsSummary> {
        self.post(
            "/api/appdaemon/generate_statistics",
            &serde_json::json!({ "entity_id": self.entity_id }),
        )
        .await
    }

    /// Compile cost statistics. `rate_override` wins over the configured
    /// rate; with neither, the endpoint uses whatever rate it already knows.
    ///
    /// # Errors
    /// Returns [`GridwattError::PublishFailed`] on any non-200 response.
    pub async fn generate_cost_statistics(
        &self,
        rate_override: Option<f64>,
    ) -> Result<CostSummary> {
        let mut payload = serde_json::json!({
            "energy_entity_id": self.entity_id,
            "cost_entity_id": format!("{}_cost", self.entity_id),
        });
        if let Some(rate) = rate_override.or(self.rate) {
            payload["rate"] = serde_json::json!(format!("{rate}"));
        }

        self.post("/api/appdaemon/generate_cost_statistics", &payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utility::Utility;
    use chrono::NaiveDate;

    #[test]
    fn interval_readings_use_their_start_time() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let start = date.and_hms_opt(13, 0, 0).unwrap();
        let reading = UsageReading::new(
            date,
            Some(start),
            Some(start + chrono::Duration::hours(1)),
            1.256,
            Utility::Coned,
        );

        let payload = BackfillPayload::for_reading("sensor.coned_energy_usage", &reading);
        assert_eq!(payload.state, "1.26");
        assert_eq!(payload.last_changed, "2024-03-01T13:00:00");
        assert_eq!(payload.last_updated, payload.last_changed);
    }

    #[test]
    fn daily_readings_fall_back_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let reading = UsageReading::new(date, None, None, 12.0, Utility::Nyseg);

        let payload = BackfillPayload::for_reading("sensor.nyseg_energy_usage", &reading);
        assert_eq!(payload.last_changed, "2024-03-01T00:00:00");
        assert_eq!(payload.state, "12.00");
    }

    #[test]
    fn publisher_requires_complete_config() {
        let err = Publisher::new(&DashboardConfig::default()).unwrap_err();
        assert!(matches!(err, GridwattError::Config(_)));
    }
}
