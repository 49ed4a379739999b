//! Canonical time-series writer and watermark reads
//!
//! All weather_data writes go through one upsert keyed on
//! (station, timestamp, variable); a batch commits atomically or not at
//! all. The watermark is never tracked separately: it is always the max
//! persisted timestamp read back from the table, so data and watermark
//! cannot drift apart.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

use shared::{CanonicalObservation, Variable};

use crate::error::AppResult;

/// Rows per INSERT statement; batches above this are split inside one
/// transaction to stay under the Postgres bind-parameter limit
const UPSERT_CHUNK: usize = 1000;

/// Store for canonical observation tuples
#[derive(Clone)]
pub struct ObservationStore {
    db: PgPool,
}

/// One observation value joined with its station, as consumed by the zone
/// aggregator
#[derive(Debug, Clone, FromRow)]
pub struct ZoneReading {
    pub station_id: Uuid,
    pub variable: String,
    pub value: Decimal,
}

impl ObservationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Idempotent bulk upsert; returns the number of newly inserted rows.
    ///
    /// Conflicting keys overwrite value/unit/quality in place, so corrected
    /// provider re-publications replace stale values instead of duplicating.
    pub async fn upsert_batch(&self, observations: &[CanonicalObservation]) -> AppResult<u64> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut inserted = 0u64;

        for chunk in observations.chunks(UPSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO weather_data (station_id, timestamp, variable, value, unit, quality) ",
            );
            builder.push_values(chunk, |mut b, obs| {
                b.push_bind(obs.station_id)
                    .push_bind(obs.timestamp)
                    .push_bind(obs.variable.canonical_name())
                    .push_bind(obs.value)
                    .push_bind(&obs.unit)
                    .push_bind(obs.quality.code());
            });
            builder.push(
                " ON CONFLICT (station_id, timestamp, variable) DO UPDATE SET \
                 value = EXCLUDED.value, unit = EXCLUDED.unit, quality = EXCLUDED.quality \
                 RETURNING (xmax = 0) AS newly_inserted",
            );

            let fresh: Vec<bool> = builder.build_query_scalar().fetch_all(&mut *tx).await?;
            inserted += fresh.into_iter().filter(|new| *new).count() as u64;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Watermark: max persisted timestamp for one (station, variable)
    pub async fn watermark(
        &self,
        station_id: Uuid,
        variable: &Variable,
    ) -> AppResult<Option<NaiveDateTime>> {
        let watermark = sqlx::query_scalar::<_, Option<NaiveDateTime>>(
            "SELECT MAX(timestamp) FROM weather_data WHERE station_id = $1 AND variable = $2",
        )
        .bind(station_id)
        .bind(variable.canonical_name())
        .fetch_one(&self.db)
        .await?;

        Ok(watermark)
    }

    /// Readings for all stations of a zone on one civil calendar day.
    ///
    /// Bad-quality values are excluded from aggregation.
    pub async fn zone_day_readings(
        &self,
        zone_id: Uuid,
        date: chrono::NaiveDate,
    ) -> AppResult<Vec<ZoneReading>> {
        let readings = sqlx::query_as::<_, ZoneReading>(
            r#"
            SELECT w.station_id, w.variable, w.value
            FROM weather_data w
            JOIN weather_stations s ON s.station_id = w.station_id
            WHERE s.zone_id = $1
              AND w.timestamp >= $2::date
              AND w.timestamp < ($2::date + INTERVAL '1 day')
              AND w.quality <> 'bad'
            "#,
        )
        .bind(zone_id)
        .bind(date)
        .fetch_all(&self.db)
        .await?;

        Ok(readings)
    }
}
