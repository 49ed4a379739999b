//! Zone-daily aggregation and GDD accumulation
//!
//! Combines all member-station readings of a zone into one record per
//! calendar day and maintains the running cumulative GDD per vintage-year.
//! Recomputation is idempotent: the same underlying observations always
//! converge to the same row, and a day with no contributing stations
//! produces no row at all.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use shared::{
    gdd_base_ten, gdd_base_zero, gdd_day, huglin_coefficient, huglin_sum, vintage_year,
    Confidence, Variable,
};

use crate::error::{AppError, AppResult};
use crate::services::observations::{ObservationStore, ZoneReading};
use crate::services::stations::StationService;

/// One zone-day fold over member-station readings
#[derive(Debug, Clone, PartialEq)]
pub struct DayAggregate {
    pub temp_mean: Decimal,
    pub temp_min: Decimal,
    pub temp_max: Decimal,
    pub humidity_mean: Option<Decimal>,
    pub rainfall_mm: Option<Decimal>,
    pub solar_radiation: Option<Decimal>,
    pub gdd_base0: Decimal,
    pub gdd_base10: Decimal,
    pub station_count: i64,
    pub confidence: Confidence,
}

/// Fold a day's readings into one aggregate.
///
/// Temperature drives everything: no temperature readings means nothing to
/// aggregate, represented as `None` rather than a row of nulls. Confidence
/// comes from the count of distinct stations contributing temperature.
pub fn aggregate_day(
    readings: &[ZoneReading],
    high_confidence_min_stations: i64,
) -> Option<DayAggregate> {
    let mut temps: Vec<Decimal> = Vec::new();
    let mut temp_stations: BTreeSet<Uuid> = BTreeSet::new();
    let mut humidity: Vec<Decimal> = Vec::new();
    let mut rainfall: Vec<Decimal> = Vec::new();
    let mut solar: Vec<Decimal> = Vec::new();

    for reading in readings {
        match Variable::from_provider_field(&reading.variable) {
            Variable::Temp => {
                temps.push(reading.value);
                temp_stations.insert(reading.station_id);
            }
            Variable::Humidity => humidity.push(reading.value),
            Variable::Rainfall => rainfall.push(reading.value),
            Variable::SolarRadiation => solar.push(reading.value),
            _ => {}
        }
    }

    if temps.is_empty() {
        return None;
    }

    let temp_min = temps.iter().copied().min()?;
    let temp_max = temps.iter().copied().max()?;
    let temp_mean = mean(&temps)?;
    let station_count = temp_stations.len() as i64;

    Some(DayAggregate {
        temp_mean,
        temp_min,
        temp_max,
        humidity_mean: mean(&humidity),
        rainfall_mm: total(&rainfall),
        solar_radiation: total(&solar),
        gdd_base0: gdd_day(temp_max, temp_min, gdd_base_zero()),
        gdd_base10: gdd_day(temp_max, temp_min, gdd_base_ten()),
        station_count,
        confidence: confidence_for(station_count, high_confidence_min_stations),
    })
}

/// Coverage-based confidence for a zone-day
pub fn confidence_for(station_count: i64, high_confidence_min_stations: i64) -> Confidence {
    if station_count >= high_confidence_min_stations {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len()))
}

fn total(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().copied().sum())
}

/// Outcome of an aggregation run
#[derive(Debug, Clone, Default)]
pub struct AggregationSummary {
    pub zones: usize,
    pub days_written: u64,
    pub days_empty: u64,
}

/// Zone aggregation service
#[derive(Clone)]
pub struct ZoneAggregationService {
    db: PgPool,
    store: ObservationStore,
    stations: StationService,
    high_confidence_min_stations: i64,
}

impl ZoneAggregationService {
    pub fn new(db: PgPool, high_confidence_min_stations: i64) -> Self {
        Self {
            store: ObservationStore::new(db.clone()),
            stations: StationService::new(db.clone()),
            db,
            high_confidence_min_stations,
        }
    }

    /// Recompute zone-daily rows for a date range, in date order per zone
    pub async fn run(
        &self,
        zone: Option<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
        dry_run: bool,
    ) -> AppResult<AggregationSummary> {
        if start > end {
            return Err(AppError::Validation(format!(
                "aggregation start {} is after end {}",
                start, end
            )));
        }

        let zones = match zone {
            Some(z) => vec![z],
            None => self.stations.zone_ids().await?,
        };

        let mut summary = AggregationSummary {
            zones: zones.len(),
            ..Default::default()
        };
        for zone_id in zones {
            self.run_zone(zone_id, start, end, dry_run, &mut summary)
                .await?;
        }
        Ok(summary)
    }

    async fn run_zone(
        &self,
        zone_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        dry_run: bool,
        summary: &mut AggregationSummary,
    ) -> AppResult<()> {
        let mut running_vintage = vintage_year(start);
        let (mut cum0, mut cum10) = self.seed_cumulative(zone_id, start, running_vintage).await?;
        let mut processed_days: Vec<(Decimal, Decimal)> = Vec::new();

        let mut date = start;
        while date <= end {
            let vintage = vintage_year(date);
            if vintage != running_vintage {
                running_vintage = vintage;
                cum0 = Decimal::ZERO;
                cum10 = Decimal::ZERO;
            }

            let readings = self.store.zone_day_readings(zone_id, date).await?;
            match aggregate_day(&readings, self.high_confidence_min_stations) {
                None => {
                    debug!(zone = %zone_id, date = %date, "no contributing stations, no row");
                    summary.days_empty += 1;
                }
                Some(aggregate) => {
                    cum0 += aggregate.gdd_base0;
                    cum10 += aggregate.gdd_base10;
                    processed_days.push((aggregate.temp_mean, aggregate.temp_max));

                    if dry_run {
                        info!(
                            zone = %zone_id,
                            date = %date,
                            gdd_base0_cumulative = %cum0,
                            "dry run, skipping write"
                        );
                    } else {
                        self.upsert_day(zone_id, date, vintage, &aggregate, cum0, cum10)
                            .await?;
                    }
                    summary.days_written += 1;
                }
            }
            date += Duration::days(1);
        }

        // Informational only: the Huglin index has no persisted column.
        if !processed_days.is_empty() {
            if let Some(latitude) = self.stations.zone_latitude(zone_id).await? {
                let huglin = huglin_sum(processed_days, huglin_coefficient(latitude));
                debug!(zone = %zone_id, %huglin, "Huglin index over processed range");
            }
        }
        Ok(())
    }

    /// Running cumulative GDD as of the last persisted day before `start`
    /// within the same vintage-year
    async fn seed_cumulative(
        &self,
        zone_id: Uuid,
        start: NaiveDate,
        vintage: i32,
    ) -> AppResult<(Decimal, Decimal)> {
        let seed = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            SELECT gdd_base0_cumulative, gdd_base10_cumulative
            FROM climate_zone_daily
            WHERE zone_id = $1 AND date < $2 AND vintage_year = $3
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(zone_id)
        .bind(start)
        .bind(vintage)
        .fetch_optional(&self.db)
        .await?;

        Ok(seed.unwrap_or((Decimal::ZERO, Decimal::ZERO)))
    }

    async fn upsert_day(
        &self,
        zone_id: Uuid,
        date: NaiveDate,
        vintage: i32,
        aggregate: &DayAggregate,
        cum0: Decimal,
        cum10: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO climate_zone_daily (
                zone_id, date, vintage_year,
                temp_mean, temp_min, temp_max, humidity_mean,
                rainfall_mm, solar_radiation,
                gdd_base0_daily, gdd_base0_cumulative,
                gdd_base10_daily, gdd_base10_cumulative,
                station_count, confidence
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (zone_id, date) DO UPDATE SET
                vintage_year = EXCLUDED.vintage_year,
                temp_mean = EXCLUDED.temp_mean,
                temp_min = EXCLUDED.temp_min,
                temp_max = EXCLUDED.temp_max,
                humidity_mean = EXCLUDED.humidity_mean,
                rainfall_mm = EXCLUDED.rainfall_mm,
                solar_radiation = EXCLUDED.solar_radiation,
                gdd_base0_daily = EXCLUDED.gdd_base0_daily,
                gdd_base0_cumulative = EXCLUDED.gdd_base0_cumulative,
                gdd_base10_daily = EXCLUDED.gdd_base10_daily,
                gdd_base10_cumulative = EXCLUDED.gdd_base10_cumulative,
                station_count = EXCLUDED.station_count,
                confidence = EXCLUDED.confidence
            "#,
        )
        .bind(zone_id)
        .bind(date)
        .bind(vintage)
        .bind(aggregate.temp_mean)
        .bind(aggregate.temp_min)
        .bind(aggregate.temp_max)
        .bind(aggregate.humidity_mean)
        .bind(aggregate.rainfall_mm)
        .bind(aggregate.solar_radiation)
        .bind(aggregate.gdd_base0)
        .bind(cum0)
        .bind(aggregate.gdd_base10)
        .bind(cum10)
        .bind(aggregate.station_count)
        .bind(aggregate.confidence.code())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
