//! Risk zone persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{coordinate_at, db_precision, from_db_time, parse_text, to_db_time, Storage};
use crate::error::Result;
use crate::zone::{RiskZone, ZoneSpec, ZoneState};

const ZONE_COLUMNS: &str = "id, name, latitude, longitude, radius_km, risk_level, description, \
                            created_by, created_at, active";

impl Storage {
    /// Insert a new active zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_zone(
        &self,
        spec: &ZoneSpec,
        created_by: Option<i64>,
        created_at: DateTime<Utc>,
    ) -> Result<RiskZone> {
        let created_at = db_precision(created_at);
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO risk_zones
                (name, latitude, longitude, radius_km, risk_level, description, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                spec.name,
                spec.center.latitude(),
                spec.center.longitude(),
                spec.radius_km,
                spec.risk_level.to_string(),
                spec.description,
                created_by,
                to_db_time(&created_at),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(zone_id = id, name = %spec.name, "Inserted risk zone");
        Ok(RiskZone {
            id,
            name: spec.name.clone(),
            center: spec.center,
            radius_km: spec.radius_km,
            risk_level: spec.risk_level,
            description: spec.description.clone(),
            state: ZoneState::Active,
            created_by,
            created_at,
        })
    }

    /// Replace a zone's descriptive and geometric fields.
    ///
    /// Returns `false` if the zone does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_zone(&self, id: i64, spec: &ZoneSpec) -> Result<bool> {
        let affected = self.conn()?.execute(
            r"
            UPDATE risk_zones
            SET name = ?1, latitude = ?2, longitude = ?3, radius_km = ?4,
                risk_level = ?5, description = ?6
            WHERE id = ?7
            ",
            params![
                spec.name,
                spec.center.latitude(),
                spec.center.longitude(),
                spec.radius_km,
                spec.risk_level.to_string(),
                spec.description,
                id,
            ],
        )?;
        Ok(affected > 0)
    }

    /// Set a zone's lifecycle state.
    ///
    /// Returns `false` if the zone does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_zone_state(&self, id: i64, state: ZoneState) -> Result<bool> {
        let active = i32::from(state == ZoneState::Active);
        let affected = self.conn()?.execute(
            "UPDATE risk_zones SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(affected > 0)
    }

    /// Get a zone by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_zone(&self, id: i64) -> Result<Option<RiskZone>> {
        let sql = format!("SELECT {ZONE_COLUMNS} FROM risk_zones WHERE id = ?1");
        let zone = self
            .conn()?
            .query_row(&sql, [id], Self::row_to_zone)
            .optional()?;
        Ok(zone)
    }

    /// List active zones in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_active_zones(&self) -> Result<Vec<RiskZone>> {
        self.query_zones("WHERE active = 1")
    }

    /// List every zone, including retired ones, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_all_zones(&self) -> Result<Vec<RiskZone>> {
        self.query_zones("")
    }

    fn query_zones(&self, filter: &str) -> Result<Vec<RiskZone>> {
        let sql = format!("SELECT {ZONE_COLUMNS} FROM risk_zones {filter} ORDER BY id ASC");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let zones = stmt
            .query_map([], Self::row_to_zone)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(zones)
    }

    fn row_to_zone(row: &rusqlite::Row) -> rusqlite::Result<RiskZone> {
        let risk_level: String = row.get(5)?;
        let created_at: String = row.get(8)?;
        let active: i32 = row.get(9)?;

        Ok(RiskZone {
            id: row.get(0)?,
            name: row.get(1)?,
            center: coordinate_at(row, 2, 3)?,
            radius_km: row.get(4)?,
            risk_level: parse_text(5, &risk_level)?,
            description: row.get(6)?,
            created_by: row.get(7)?,
            created_at: from_db_time(8, &created_at)?,
            state: if active == 0 {
                ZoneState::Inactive
            } else {
                ZoneState::Active
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::Coordinate;
    use crate::zone::RiskLevel;

    fn spec(name: &str, radius_km: f64) -> ZoneSpec {
        ZoneSpec {
            name: name.to_string(),
            center: Coordinate::new(12.9716, 77.5946).unwrap(),
            radius_km,
            risk_level: RiskLevel::High,
            description: Some("poorly lit".to_string()),
        }
    }

    #[test]
    fn test_insert_and_get_zone() {
        let storage = Storage::open_in_memory().unwrap();
        let zone = storage
            .insert_zone(&spec("Majestic", 2.0), Some(1), Utc::now())
            .unwrap();

        let fetched = storage.get_zone(zone.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Majestic");
        assert_eq!(fetched.state, ZoneState::Active);
        assert_eq!(fetched.created_by, Some(1));
        assert_eq!(fetched.description.as_deref(), Some("poorly lit"));
    }

    #[test]
    fn test_list_active_zones_in_creation_order() {
        let storage = Storage::open_in_memory().unwrap();
        let a = storage.insert_zone(&spec("A", 1.0), None, Utc::now()).unwrap();
        let b = storage.insert_zone(&spec("B", 1.0), None, Utc::now()).unwrap();
        let c = storage.insert_zone(&spec("C", 1.0), None, Utc::now()).unwrap();

        assert!(storage.set_zone_state(b.id, ZoneState::Inactive).unwrap());

        let ids: Vec<i64> = storage
            .list_active_zones()
            .unwrap()
            .iter()
            .map(|z| z.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);

        // Soft delete keeps the row
        let retired = storage.get_zone(b.id).unwrap().unwrap();
        assert_eq!(retired.state, ZoneState::Inactive);
        assert_eq!(storage.list_all_zones().unwrap().len(), 3);
    }

    #[test]
    fn test_update_zone() {
        let storage = Storage::open_in_memory().unwrap();
        let zone = storage.insert_zone(&spec("Old", 1.0), None, Utc::now()).unwrap();

        let mut changed = spec("New", 3.5);
        changed.risk_level = RiskLevel::Low;
        assert!(storage.update_zone(zone.id, &changed).unwrap());

        let fetched = storage.get_zone(zone.id).unwrap().unwrap();
        assert_eq!(fetched.name, "New");
        assert!((fetched.radius_km - 3.5).abs() < f64::EPSILON);
        assert_eq!(fetched.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_update_missing_zone() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(!storage.update_zone(404, &spec("X", 1.0)).unwrap());
        assert!(!storage.set_zone_state(404, ZoneState::Inactive).unwrap());
        assert!(storage.get_zone(404).unwrap().is_none());
    }
}
