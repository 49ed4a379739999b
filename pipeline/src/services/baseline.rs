//! Historical climatology baseline
//!
//! Per-(zone, day-of-vintage) means and standard deviations over the
//! 1986-07-01..2005-07-01 zone-daily history. The steady-state pipeline
//! only reads this table; it is replaced in one transaction by the
//! explicit rebuild job and by nothing else.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;

/// First day of the baseline window (vintage 1987)
pub fn baseline_window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1986, 7, 1).expect("1 July exists in every year")
}

/// Exclusive end of the baseline window (after vintage 2005)
pub fn baseline_window_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 7, 1).expect("1 July exists in every year")
}

/// Baseline repository
#[derive(Clone)]
pub struct BaselineService {
    db: PgPool,
}

/// Climatology row for one (zone, day-of-vintage)
#[derive(Debug, Clone, FromRow)]
pub struct ZoneBaseline {
    pub zone_id: Uuid,
    pub day_of_vintage: i32,
    pub tmean_avg: Option<Decimal>,
    pub tmean_sd: Option<Decimal>,
    pub rain_avg: Option<Decimal>,
    pub rain_sd: Option<Decimal>,
    pub gdd_base0_cumulative_avg: Option<Decimal>,
}

impl BaselineService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Rebuild the whole climatology table from zone-daily history.
    ///
    /// Delete and reinsert happen in one transaction so readers never see a
    /// half-built baseline.
    pub async fn rebuild(&self) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM climate_zone_daily_baseline")
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO climate_zone_daily_baseline (
                zone_id, day_of_vintage,
                tmean_avg, tmean_sd, rain_avg, rain_sd,
                gdd_base0_cumulative_avg
            )
            SELECT zone_id,
                   (date - MAKE_DATE(vintage_year - 1, 7, 1)) + 1 AS day_of_vintage,
                   AVG(temp_mean),
                   STDDEV_SAMP(temp_mean),
                   AVG(rainfall_mm),
                   STDDEV_SAMP(rainfall_mm),
                   AVG(gdd_base0_cumulative)
            FROM climate_zone_daily
            WHERE date >= $1 AND date < $2
            GROUP BY zone_id, 2
            "#,
        )
        .bind(baseline_window_start())
        .bind(baseline_window_end())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        info!(rows = inserted, "rebuilt zone-daily baseline");
        Ok(inserted)
    }

    /// Climatology for one (zone, day-of-vintage), if history covers it
    pub async fn for_day(
        &self,
        zone_id: Uuid,
        day_of_vintage: i32,
    ) -> AppResult<Option<ZoneBaseline>> {
        let baseline = sqlx::query_as::<_, ZoneBaseline>(
            r#"
            SELECT zone_id, day_of_vintage, tmean_avg, tmean_sd,
                   rain_avg, rain_sd, gdd_base0_cumulative_avg
            FROM climate_zone_daily_baseline
            WHERE zone_id = $1 AND day_of_vintage = $2
            "#,
        )
        .bind(zone_id)
        .bind(day_of_vintage)
        .fetch_optional(&self.db)
        .await?;

        Ok(baseline)
    }
}
