//! Risk zones and their administration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::geofence::{self, Coordinate};
use crate::storage::Storage;

/// Severity assigned to a risk zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    #[default]
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::validation(format!("unknown risk level: {other}"))),
        }
    }
}

/// Lifecycle of a zone. Zones are never deleted, only retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    /// Participates in containment checks.
    Active,
    /// Soft-deleted; kept so historical alerts still resolve their zone.
    Inactive,
}

/// A circular geofenced area flagged with a risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskZone {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Human-readable zone name.
    pub name: String,
    /// Center of the circle.
    pub center: Coordinate,
    /// Radius in kilometers, always positive.
    pub radius_km: f64,
    /// Risk level.
    pub risk_level: RiskLevel,
    /// Optional free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle state.
    pub state: ZoneState,
    /// Subject that created the zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    /// When the zone was created.
    pub created_at: DateTime<Utc>,
}

impl RiskZone {
    /// Whether the zone participates in containment checks.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ZoneState::Active
    }
}

/// Fields for creating or updating a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    /// Zone name, non-empty.
    pub name: String,
    /// Center of the circle.
    pub center: Coordinate,
    /// Radius in kilometers.
    pub radius_km: f64,
    /// Risk level.
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl ZoneSpec {
    /// Validate the zone fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the name is blank or the radius is not
    /// a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("zone name must not be empty"));
        }
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(Error::validation(format!(
                "zone radius must be greater than 0 km, got {}",
                self.radius_km
            )));
        }
        Ok(())
    }
}

/// Administration of risk zones.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    storage: Arc<Storage>,
}

impl ZoneRegistry {
    /// Create a registry over shared storage.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Create an active zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the zone definition is invalid.
    pub fn create(&self, spec: &ZoneSpec, created_by: Option<i64>) -> Result<RiskZone> {
        spec.validate()?;
        let zone = self.storage.insert_zone(spec, created_by, Utc::now())?;
        info!(
            zone_id = zone.id,
            name = %zone.name,
            radius_km = zone.radius_km,
            "Risk zone created"
        );
        Ok(zone)
    }

    /// Replace a zone's name, geometry, level and description.
    ///
    /// Works on retired zones too; their state is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the zone definition is invalid and
    /// [`Error::NotFound`] if the zone does not exist.
    pub fn update(&self, id: i64, spec: &ZoneSpec) -> Result<RiskZone> {
        spec.validate()?;
        if !self.storage.update_zone(id, spec)? {
            return Err(Error::not_found("risk zone", id));
        }
        info!(zone_id = id, "Risk zone updated");
        self.get(id)
    }

    /// Retire a zone. It stops matching locations but is kept for history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the zone does not exist.
    pub fn deactivate(&self, id: i64) -> Result<RiskZone> {
        if !self.storage.set_zone_state(id, ZoneState::Inactive)? {
            return Err(Error::not_found("risk zone", id));
        }
        info!(zone_id = id, "Risk zone deactivated");
        self.get(id)
    }

    /// Fetch a zone, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the zone does not exist.
    pub fn get(&self, id: i64) -> Result<RiskZone> {
        self.storage
            .get_zone(id)?
            .ok_or_else(|| Error::not_found("risk zone", id))
    }

    /// Active zones in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_active(&self) -> Result<Vec<RiskZone>> {
        self.storage.list_active_zones()
    }

    /// Every zone, retired ones included, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_all(&self) -> Result<Vec<RiskZone>> {
        self.storage.list_all_zones()
    }

    /// The first active zone containing `point`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn check_location(&self, point: &Coordinate) -> Result<Option<RiskZone>> {
        let zones = self.storage.list_active_zones()?;
        Ok(geofence::find_containing(point, &zones).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(radius_km: f64) -> ZoneSpec {
        ZoneSpec {
            name: "MG Road".to_string(),
            center: Coordinate::new(12.9756, 77.6050).unwrap(),
            radius_km,
            risk_level: RiskLevel::Medium,
            description: None,
        }
    }

    #[test]
    fn test_risk_level_round_trip_strings() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(level.to_string().parse::<RiskLevel>().unwrap(), level);
        }
        assert!("extreme".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_risk_level_default_is_high() {
        assert_eq!(RiskLevel::default(), RiskLevel::High);
    }

    #[test]
    fn test_zone_spec_validate() {
        assert!(spec(1.5).validate().is_ok());
        assert!(spec(0.0).validate().unwrap_err().is_validation());
        assert!(spec(-2.0).validate().is_err());
        assert!(spec(f64::NAN).validate().is_err());

        let mut blank = spec(1.0);
        blank.name = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_zone_spec_deserialize_defaults_level() {
        let json = r#"{
            "name": "Market",
            "center": {"latitude": 12.0, "longitude": 77.0},
            "radius_km": 0.5
        }"#;
        let parsed: ZoneSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.risk_level, RiskLevel::High);
        assert!(parsed.description.is_none());
    }

    fn registry() -> ZoneRegistry {
        ZoneRegistry::new(Arc::new(Storage::open_in_memory().unwrap()))
    }

    fn bengaluru(radius_km: f64) -> ZoneSpec {
        ZoneSpec {
            name: "Majestic".to_string(),
            center: Coordinate::new(12.9716, 77.5946).unwrap(),
            radius_km,
            risk_level: RiskLevel::High,
            description: None,
        }
    }

    #[test]
    fn test_registry_create_rejects_invalid_spec() {
        let err = registry().create(&bengaluru(0.0), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_registry_check_location() {
        let registry = registry();
        let zone = registry.create(&bengaluru(2.0), Some(1)).unwrap();

        let near = Coordinate::new(12.9750, 77.5950).unwrap();
        let far = Coordinate::new(13.0500, 77.6000).unwrap();
        assert_eq!(registry.check_location(&near).unwrap().map(|z| z.id), Some(zone.id));
        assert!(registry.check_location(&far).unwrap().is_none());

        registry.deactivate(zone.id).unwrap();
        assert!(registry.check_location(&near).unwrap().is_none());
        assert!(registry.list_active().unwrap().is_empty());
        assert_eq!(registry.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_registry_update() {
        let registry = registry();
        let zone = registry.create(&bengaluru(2.0), None).unwrap();

        let mut changed = bengaluru(5.0);
        changed.name = "Majestic Bus Stand".to_string();
        let updated = registry.update(zone.id, &changed).unwrap();
        assert_eq!(updated.name, "Majestic Bus Stand");
        assert!(updated.is_active());
        assert!(registry.update(zone.id, &bengaluru(-1.0)).unwrap_err().is_validation());
    }

    #[test]
    fn test_registry_missing_zone() {
        let registry = registry();
        assert!(registry.get(9).unwrap_err().is_not_found());
        assert!(registry.deactivate(9).unwrap_err().is_not_found());
        assert!(registry.update(9, &bengaluru(1.0)).unwrap_err().is_not_found());
    }
}
