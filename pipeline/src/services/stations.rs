//! Weather station topology and administration
//!
//! Stations are created once per provider by an operator import and never
//! deleted; only the zone assignment and the active flag change afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::path::Path;
use uuid::Uuid;
use validator::Validate;

use shared::{DataSource, StationImport};

use crate::error::{AppError, AppResult};

/// Station service for topology lookups and setup imports
#[derive(Clone)]
pub struct StationService {
    db: PgPool,
}

/// Weather station record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WeatherStation {
    pub station_id: Uuid,
    pub station_code: String,
    pub data_source: String,
    pub source_id: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub elevation: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub region: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WeatherStation {
    pub fn source(&self) -> AppResult<DataSource> {
        self.data_source.parse().map_err(AppError::Configuration)
    }
}

/// Result of a station import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

const STATION_COLUMNS: &str = "station_id, station_code, data_source, source_id, latitude, \
     longitude, elevation, zone_id, region, notes, is_active, created_at";

impl StationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active stations, optionally restricted to one provider
    pub async fn list_active(
        &self,
        source: Option<DataSource>,
    ) -> AppResult<Vec<WeatherStation>> {
        let stations = sqlx::query_as::<_, WeatherStation>(&format!(
            r#"
            SELECT {}
            FROM weather_stations
            WHERE is_active = TRUE
              AND ($1::text IS NULL OR data_source = $1)
            ORDER BY station_code
            "#,
            STATION_COLUMNS
        ))
        .bind(source.map(|s| s.code()))
        .fetch_all(&self.db)
        .await?;

        Ok(stations)
    }

    /// All stations regardless of active flag
    pub async fn list_all(&self, source: Option<DataSource>) -> AppResult<Vec<WeatherStation>> {
        let stations = sqlx::query_as::<_, WeatherStation>(&format!(
            r#"
            SELECT {}
            FROM weather_stations
            WHERE ($1::text IS NULL OR data_source = $1)
            ORDER BY station_code
            "#,
            STATION_COLUMNS
        ))
        .bind(source.map(|s| s.code()))
        .fetch_all(&self.db)
        .await?;

        Ok(stations)
    }

    /// Look up one station by its code
    pub async fn by_code(&self, station_code: &str) -> AppResult<WeatherStation> {
        let station = sqlx::query_as::<_, WeatherStation>(&format!(
            "SELECT {} FROM weather_stations WHERE station_code = $1",
            STATION_COLUMNS
        ))
        .bind(station_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::StationNotFound(station_code.to_string()))?;

        Ok(station)
    }

    /// One-time setup import from an operator CSV
    ///
    /// Rows failing validation are rejected individually and counted; the
    /// rest upsert on (data_source, source_id), touching only the mutable
    /// fields on conflict.
    pub async fn import_file(&self, path: &Path) -> AppResult<ImportSummary> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut summary = ImportSummary::default();

        for record in reader.deserialize::<StationImport>() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting malformed station row");
                    summary.rejected += 1;
                    continue;
                }
            };
            if let Err(e) = row.validate() {
                tracing::warn!(station_code = %row.station_code, error = %e, "rejecting invalid station row");
                summary.rejected += 1;
                continue;
            }

            self.upsert_station(&row).await?;
            summary.imported += 1;
        }

        Ok(summary)
    }

    async fn upsert_station(&self, row: &StationImport) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO weather_stations (
                station_code, data_source, source_id, latitude, longitude,
                elevation, zone_id, region, notes, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (data_source, source_id)
            DO UPDATE SET zone_id = EXCLUDED.zone_id, is_active = EXCLUDED.is_active
            "#,
        )
        .bind(&row.station_code)
        .bind(row.data_source.code())
        .bind(&row.source_id)
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(row.elevation)
        .bind(row.zone_id)
        .bind(&row.region)
        .bind(&row.notes)
        .bind(row.is_active.unwrap_or(true))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Assign a station to a climate zone
    pub async fn assign_zone(&self, station_code: &str, zone_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE weather_stations SET zone_id = $1 WHERE station_code = $2")
            .bind(zone_id)
            .bind(station_code)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::StationNotFound(station_code.to_string()));
        }
        Ok(())
    }

    /// Deactivate a station; stations are never deleted
    pub async fn deactivate(&self, station_code: &str) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE weather_stations SET is_active = FALSE WHERE station_code = $1")
                .bind(station_code)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::StationNotFound(station_code.to_string()));
        }
        Ok(())
    }

    /// Zones with at least one active member station
    pub async fn zone_ids(&self) -> AppResult<Vec<Uuid>> {
        let zones = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT zone_id
            FROM weather_stations
            WHERE zone_id IS NOT NULL AND is_active = TRUE
            ORDER BY zone_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(zones)
    }

    /// Zone latitude, as the mean latitude of its member stations.
    ///
    /// The pipeline does not own zone reference data, so the Huglin
    /// coefficient is derived from station geography.
    pub async fn zone_latitude(&self, zone_id: Uuid) -> AppResult<Option<Decimal>> {
        let latitude = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT AVG(latitude) FROM weather_stations WHERE zone_id = $1",
        )
        .bind(zone_id)
        .fetch_one(&self.db)
        .await?;

        Ok(latitude)
    }
}
