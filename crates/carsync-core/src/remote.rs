//! HTTP client for the remote vehicle record service
//!
//! Two endpoints, JSON bodies:
//! - `PUT /api/vehicle/details` — idempotent full upsert of one record
//! - `GET /api/vehicle/changedvehicles?since=…` — records changed at or
//!   after `since`
//!
//! The `since` timestamp is transmitted without a timezone offset on
//! purpose: the remote compares it against a naive timestamp column, and a
//! suffixed offset would skew that comparison.

use chrono::NaiveDateTime;
use reqwest::Client;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::types::Vehicle;

/// Wire format for the `since` query parameter: ISO-8601, no offset
const SINCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Client for the remote record service
#[derive(Debug, Clone)]
pub struct VehicleService {
    base_url: String,
    client: Client,
}

impl VehicleService {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Upsert one vehicle record on the remote.
    ///
    /// Any non-2xx status is a failure; the caller decides what to do with
    /// the record (for the sync engine: leave it queued and abort).
    pub async fn put_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        let url = format!("{}/api/vehicle/details", self.base_url);
        debug!(license = %vehicle.license_number, "Pushing vehicle upsert");

        let response = self.client.put(&url).json(vehicle).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "upsert of {} failed: HTTP {}",
                vehicle.license_number,
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch all records changed at or after `since`.
    pub async fn changed_vehicles(&self, since: NaiveDateTime) -> StoreResult<Vec<Vehicle>> {
        let url = format!("{}/api/vehicle/changedvehicles", self.base_url);
        let since = since.format(SINCE_FORMAT).to_string();
        debug!(%since, "Fetching changed vehicles");

        let response = self
            .client
            .get(&url)
            .query(&[("since", since.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "change feed request failed: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_since_format_has_no_offset() {
        let since = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            since.format(SINCE_FORMAT).to_string(),
            "2024-05-01T10:30:00.000000"
        );
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let service = VehicleService::new("http://localhost:5000/");
        assert_eq!(service.base_url, "http://localhost:5000");
    }
}
