//! Vehicle metadata recorded by the asset registry at mint time.

use serde::{Deserialize, Serialize};

use crate::{LedgerError, LedgerResult};

/// Oldest model year the registry accepts.
const MIN_MODEL_YEAR: u16 = 1886;

/// Descriptive record of a tokenized vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleMetadata {
    /// Vehicle identification number. Unique per registry.
    pub vin: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    /// Odometer reading in kilometres at mint time.
    pub mileage_km: u32,
    /// National registration number (RENAVAM in Brazil).
    pub registration: String,
    /// Off-ledger metadata pointer, may be empty.
    pub token_uri: String,
}

impl VehicleMetadata {
    #[must_use]
    pub fn new(
        vin: impl Into<String>,
        make: impl Into<String>,
        model: impl Into<String>,
        year: u16,
        mileage_km: u32,
        registration: impl Into<String>,
    ) -> Self {
        Self {
            vin: vin.into(),
            make: make.into(),
            model: model.into(),
            year,
            mileage_km,
            registration: registration.into(),
            token_uri: String::new(),
        }
    }

    #[must_use]
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    /// Reject records the registry would not mint.
    pub fn validate(&self) -> LedgerResult<()> {
        let reason = if self.vin.trim().is_empty() {
            Some("VIN must not be empty")
        } else if self.make.trim().is_empty() {
            Some("make must not be empty")
        } else if self.model.trim().is_empty() {
            Some("model must not be empty")
        } else if self.year < MIN_MODEL_YEAR {
            Some("model year predates the automobile")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(LedgerError::InvalidVehicle {
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Human label, e.g. "2023 Tesla Model S".
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn civic() -> VehicleMetadata {
        VehicleMetadata::new("1HGCM82633A004352", "Honda", "Civic", 2021, 20_000, "RENAVAM123456")
    }

    #[test]
    fn valid_vehicle_passes() {
        assert!(civic().validate().is_ok());
        assert_eq!(civic().label(), "2021 Honda Civic");
    }

    #[test]
    fn empty_vin_rejected() {
        let mut v = civic();
        v.vin = "  ".into();
        let err = v.validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidVehicle { .. }));
    }

    #[test]
    fn ancient_year_rejected() {
        let mut v = civic();
        v.year = 1700;
        assert!(v.validate().is_err());
    }

    #[test]
    fn token_uri_builder() {
        let v = civic().with_token_uri("ipfs://car");
        assert_eq!(v.token_uri, "ipfs://car");
    }
}
