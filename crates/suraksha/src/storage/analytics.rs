//! Aggregate queries for the operations dashboard.
//!
//! Each report is a single SQL statement; nothing here writes.

use serde::Serialize;

use super::{from_db_time, Storage};
use crate::error::Result;

/// Headline counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Alerts ever raised.
    pub total_alerts: i64,
    /// Alerts still awaiting resolution.
    pub active_alerts: i64,
    /// Crime reports received.
    pub total_reports: i64,
    /// Zones currently in force.
    pub active_zones: i64,
    /// Evidence records attached to any alert.
    pub total_evidence: i64,
}

/// Reports per crime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeTypeCount {
    /// Crime type label.
    pub crime_type: String,
    /// Number of reports.
    pub count: i64,
}

/// Reports per time bucket (`"HH"` for hourly, `"YYYY-MM"` for monthly).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCount {
    /// Bucket label.
    pub period: String,
    /// Number of reports.
    pub count: i64,
}

/// Time from trigger to resolution for one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTime {
    /// Alert ID.
    pub alert_id: i64,
    /// Subject who raised it.
    pub subject_id: i64,
    /// Trigger time.
    pub triggered_at: chrono::DateTime<chrono::Utc>,
    /// Resolution time.
    pub resolved_at: chrono::DateTime<chrono::Utc>,
    /// Whole minutes between the two.
    pub response_minutes: i64,
}

/// Recent response times with their mean.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimes {
    /// Most recently triggered resolved alerts.
    pub entries: Vec<ResponseTime>,
    /// Mean of `response_minutes`, rounded; 0 when there are no entries.
    pub average_minutes: i64,
}

/// Alerts tagged to each active zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneEffectiveness {
    /// Zone ID.
    pub zone_id: i64,
    /// Zone name.
    pub zone_name: String,
    /// Alerts raised inside the zone.
    pub alert_count: i64,
}

/// Report count for a grid cell of roughly 1 km.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaDensity {
    /// Latitude rounded to two decimals.
    pub latitude: f64,
    /// Longitude rounded to two decimals.
    pub longitude: f64,
    /// Reports in the cell.
    pub report_count: i64,
    /// One address seen in the cell, if any report had one.
    pub address: Option<String>,
}

const RESPONSE_TIME_LIMIT: i64 = 50;
const MONTHLY_TREND_LIMIT: i64 = 12;
const AREA_DENSITY_LIMIT: i64 = 20;

impl Storage {
    /// Headline counts for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let stats = self.conn()?.query_row(
            r"
            SELECT
                (SELECT COUNT(*) FROM alerts),
                (SELECT COUNT(*) FROM alerts WHERE status = 'active'),
                (SELECT COUNT(*) FROM crime_reports),
                (SELECT COUNT(*) FROM risk_zones WHERE active = 1),
                (SELECT COUNT(*) FROM evidence)
            ",
            [],
            |row| {
                Ok(DashboardStats {
                    total_alerts: row.get(0)?,
                    active_alerts: row.get(1)?,
                    total_reports: row.get(2)?,
                    active_zones: row.get(3)?,
                    total_evidence: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Report counts per crime type, most common first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn crime_type_distribution(&self) -> Result<Vec<CrimeTypeCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT crime_type, COUNT(*) AS count
            FROM crime_reports
            GROUP BY crime_type
            ORDER BY count DESC, crime_type ASC
            ",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CrimeTypeCount {
                    crime_type: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Report counts per UTC hour of day, in hour order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn hourly_report_trend(&self) -> Result<Vec<PeriodCount>> {
        self.period_counts(
            r"
            SELECT strftime('%H', reported_at) AS period, COUNT(*)
            FROM crime_reports
            GROUP BY period
            ORDER BY period ASC
            ",
            None,
        )
    }

    /// Report counts for the twelve most recent months with reports, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn monthly_report_trend(&self) -> Result<Vec<PeriodCount>> {
        self.period_counts(
            r"
            SELECT strftime('%Y-%m', reported_at) AS period, COUNT(*)
            FROM crime_reports
            GROUP BY period
            ORDER BY period DESC
            LIMIT ?1
            ",
            Some(MONTHLY_TREND_LIMIT),
        )
    }

    fn period_counts(&self, sql: &str, limit: Option<i64>) -> Result<Vec<PeriodCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let map = |row: &rusqlite::Row| -> rusqlite::Result<PeriodCount> {
            Ok(PeriodCount {
                period: row.get(0)?,
                count: row.get(1)?,
            })
        };
        let rows = match limit {
            Some(limit) => stmt.query_map([limit], map)?,
            None => stmt.query_map([], map)?,
        }
        .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Response times for the most recently triggered resolved alerts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn response_times(&self) -> Result<ResponseTimes> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, subject_id, triggered_at, resolved_at,
                   CAST(ROUND((julianday(resolved_at) - julianday(triggered_at)) * 24 * 60) AS INTEGER)
            FROM alerts
            WHERE status = 'resolved' AND resolved_at IS NOT NULL
            ORDER BY triggered_at DESC, id DESC
            LIMIT ?1
            ",
        )?;
        let entries = stmt
            .query_map([RESPONSE_TIME_LIMIT], |row| {
                let triggered_at: String = row.get(2)?;
                let resolved_at: String = row.get(3)?;
                Ok(ResponseTime {
                    alert_id: row.get(0)?,
                    subject_id: row.get(1)?,
                    triggered_at: from_db_time(2, &triggered_at)?,
                    resolved_at: from_db_time(3, &resolved_at)?,
                    response_minutes: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let average_minutes = average_rounded(entries.iter().map(|e| e.response_minutes));
        Ok(ResponseTimes {
            entries,
            average_minutes,
        })
    }

    /// Alert counts per active zone, busiest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn zone_effectiveness(&self) -> Result<Vec<ZoneEffectiveness>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT z.id, z.name, COUNT(a.id) AS alert_count
            FROM risk_zones z
            LEFT JOIN alerts a ON a.zone_id = z.id
            WHERE z.active = 1
            GROUP BY z.id, z.name
            ORDER BY alert_count DESC, z.id ASC
            ",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ZoneEffectiveness {
                    zone_id: row.get(0)?,
                    zone_name: row.get(1)?,
                    alert_count: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Densest report cells on a two-decimal grid.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn area_density(&self) -> Result<Vec<AreaDensity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT ROUND(latitude, 2) AS lat_cell,
                   ROUND(longitude, 2) AS lon_cell,
                   COUNT(*) AS report_count,
                   MAX(address)
            FROM crime_reports
            GROUP BY lat_cell, lon_cell
            ORDER BY report_count DESC, lat_cell ASC, lon_cell ASC
            LIMIT ?1
            ",
        )?;
        let rows = stmt
            .query_map([AREA_DENSITY_LIMIT], |row| {
                Ok(AreaDensity {
                    latitude: row.get(0)?,
                    longitude: row.get(1)?,
                    report_count: row.get(2)?,
                    address: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn average_rounded(values: impl ExactSizeIterator<Item = i64>) -> i64 {
    let len = values.len();
    if len == 0 {
        return 0;
    }
    let total: i64 = values.sum();
    (total as f64 / len as f64).round() as i64
}
