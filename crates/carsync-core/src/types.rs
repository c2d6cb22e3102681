//! Core record types for the vehicle store
//!
//! JSON field names are camelCase to match the remote record service's
//! wire format.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Fuel gauge reading recorded during a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TankLevel {
    Full,
    ThreeQuarters,
    Half,
    Quarter,
    Empty,
}

/// Area of the vehicle an inspection note refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehiclePart {
    Front,
    Rear,
    Left,
    Right,
    Interior,
    Engine,
    Roof,
}

/// A free-text note attached to one area of the vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionNote {
    pub location: VehiclePart,
    pub text: String,
}

/// A vehicle record
///
/// The natural key is `license_number`, unique per collection and
/// case-insensitive for lookup. `last_updated` is set by the remote service
/// and drives the incremental pull watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub license_number: String,
    pub make: String,
    pub model: String,
    pub registration_date: NaiveDate,
    pub mileage: u32,
    pub tank: TankLevel,
    #[serde(default)]
    pub notes: Vec<InspectionNote>,
    pub last_updated: DateTime<Utc>,
}

impl Vehicle {
    /// Normalized form of the natural key, used as the storage key in both
    /// record tables.
    pub fn storage_key(&self) -> String {
        normalize_key(&self.license_number)
    }
}

/// Uppercase a license number for case-insensitive matching
pub fn normalize_key(license_number: &str) -> String {
    license_number.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vehicle {
        Vehicle {
            license_number: "ab12cde".to_string(),
            make: "Volvo".to_string(),
            model: "V70".to_string(),
            registration_date: NaiveDate::from_ymd_opt(2018, 3, 14).unwrap(),
            mileage: 83_500,
            tank: TankLevel::Half,
            notes: vec![InspectionNote {
                location: VehiclePart::Front,
                text: "Stone chip in windscreen".to_string(),
            }],
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_storage_key_is_uppercased() {
        assert_eq!(sample().storage_key(), "AB12CDE");
        assert_eq!(normalize_key("xyz999"), "XYZ999");
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["licenseNumber"], "ab12cde");
        assert_eq!(json["registrationDate"], "2018-03-14");
        assert_eq!(json["tank"], "Half");
        assert_eq!(json["notes"][0]["location"], "Front");
        assert!(json["lastUpdated"].is_string());
    }

    #[test]
    fn test_missing_notes_default_to_empty() {
        let json = r#"{
            "licenseNumber": "AB12CDE",
            "make": "Volvo",
            "model": "V70",
            "registrationDate": "2018-03-14",
            "mileage": 83500,
            "tank": "Full",
            "lastUpdated": "2024-05-01T10:00:00Z"
        }"#;
        let vehicle: Vehicle = serde_json::from_str(json).unwrap();
        assert!(vehicle.notes.is_empty());
    }
}
