//! Phenological stage forecasting
//!
//! A state machine over each variety's ordered GDD thresholds: the first
//! unmet threshold determines the current stage. Thresholds already reached
//! report the evaluation date itself; unmet thresholds are projected
//! forward only when a positive trailing accumulation rate exists, and left
//! absent otherwise — never guessed.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use shared::{
    civil_today, day_of_vintage, vintage_year, Confidence, Stage, VarietyThresholds,
};

use crate::error::{AppError, AppResult};
use crate::services::baseline::BaselineService;

/// Current-season inputs for one zone at an evaluation date
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSnapshot {
    /// Cumulative base-0 GDD as of the evaluation date
    pub cumulative_gdd: Decimal,
    /// Mean daily base-0 GDD over the trailing window, positive values only
    pub trailing_rate: Option<Decimal>,
    /// Days in the trailing window that had a zone-daily row
    pub lookback_days_with_data: i64,
    pub lookback_days: i64,
}

/// One computed estimate before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct PhenologyAssessment {
    pub gdd_accumulated: Decimal,
    pub current_stage: Stage,
    pub flowering_date: Option<NaiveDate>,
    pub veraison_date: Option<NaiveDate>,
    /// Parallel to [`shared::HARVEST_SUGAR_LEVELS`]
    pub harvest_dates: [Option<NaiveDate>; 6],
    pub gdd_vs_baseline: Option<Decimal>,
    pub days_vs_baseline: Option<i32>,
    pub confidence: Confidence,
}

/// Stage from cumulative GDD against the variety's thresholds, in ascending
/// order; unconfigured boundaries are skipped
pub fn current_stage(cumulative: Decimal, thresholds: &VarietyThresholds) -> Stage {
    let mut stage = Stage::PreFlowering;
    if let Some(flowering) = thresholds.flowering {
        if cumulative < flowering {
            return stage;
        }
        stage = Stage::Flowering;
    }
    if let Some(veraison) = thresholds.veraison {
        if cumulative < veraison {
            return stage;
        }
        stage = Stage::Veraison;
    }
    if let Some(first_harvest) = thresholds.first_harvest() {
        if cumulative < first_harvest {
            return stage;
        }
        stage = Stage::Ripening;
    }
    if let Some(last_harvest) = thresholds.last_harvest() {
        if cumulative < last_harvest {
            return stage;
        }
        stage = Stage::HarvestReady;
    }
    stage
}

/// Mean daily accumulation over the trailing window; `None` unless positive
pub fn trailing_rate(daily_gdd: &[Decimal]) -> Option<Decimal> {
    if daily_gdd.is_empty() {
        return None;
    }
    let sum: Decimal = daily_gdd.iter().copied().sum();
    let rate = sum / Decimal::from(daily_gdd.len());
    (rate > Decimal::ZERO).then_some(rate)
}

/// Date a threshold is (or was) crossed.
///
/// Already reached means "occurred by this date": the evaluation date is
/// reported exactly. Not reached projects linearly at the trailing rate,
/// or stays absent without one.
pub fn project_threshold(
    cumulative: Decimal,
    threshold: Decimal,
    rate: Option<Decimal>,
    eval_date: NaiveDate,
) -> Option<NaiveDate> {
    if cumulative >= threshold {
        return Some(eval_date);
    }
    let rate = rate.filter(|r| *r > Decimal::ZERO)?;
    let days = ((threshold - cumulative) / rate).ceil().to_i64()?;
    eval_date.checked_add_signed(Duration::days(days))
}

/// Confidence from trailing-window coverage: no positive rate means `low`,
/// at least 70% of the window present means `high`
pub fn estimate_confidence(
    days_with_data: i64,
    lookback_days: i64,
    rate: Option<Decimal>,
) -> Confidence {
    if rate.is_none() {
        return Confidence::Low;
    }
    if lookback_days > 0 && days_with_data * 10 >= lookback_days * 7 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

/// Full assessment for one (zone season, variety)
pub fn assess(
    season: &SeasonSnapshot,
    thresholds: &VarietyThresholds,
    baseline_cumulative: Option<Decimal>,
    eval_date: NaiveDate,
) -> PhenologyAssessment {
    let cumulative = season.cumulative_gdd;
    let rate = season.trailing_rate;

    let flowering_date = thresholds
        .flowering
        .and_then(|thr| project_threshold(cumulative, thr, rate, eval_date));
    let veraison_date = thresholds
        .veraison
        .and_then(|thr| project_threshold(cumulative, thr, rate, eval_date));
    let mut harvest_dates = [None; 6];
    for (slot, threshold) in harvest_dates.iter_mut().zip(thresholds.harvest.iter()) {
        *slot = threshold.and_then(|thr| project_threshold(cumulative, thr, rate, eval_date));
    }

    let gdd_vs_baseline = baseline_cumulative.map(|baseline| cumulative - baseline);
    let days_vs_baseline = match (gdd_vs_baseline, rate) {
        (Some(gdd), Some(rate)) if rate > Decimal::ZERO => (gdd / rate).round().to_i32(),
        _ => None,
    };

    PhenologyAssessment {
        gdd_accumulated: cumulative,
        current_stage: current_stage(cumulative, thresholds),
        flowering_date,
        veraison_date,
        harvest_dates,
        gdd_vs_baseline,
        days_vs_baseline,
        confidence: estimate_confidence(
            season.lookback_days_with_data,
            season.lookback_days,
            rate,
        ),
    }
}

/// Outcome of a phenology run
#[derive(Debug, Clone, Default)]
pub struct EstimateSummary {
    pub zones: usize,
    pub zones_without_data: usize,
    pub estimates: u64,
}

/// Phenology forecasting service
#[derive(Clone)]
pub struct PhenologyService {
    db: PgPool,
    baseline: BaselineService,
    rate_lookback_days: i64,
}

#[derive(Debug, FromRow)]
struct ThresholdRow {
    variety_code: String,
    gdd_flowering: Option<Decimal>,
    gdd_veraison: Option<Decimal>,
    gdd_harvest_170: Option<Decimal>,
    gdd_harvest_180: Option<Decimal>,
    gdd_harvest_190: Option<Decimal>,
    gdd_harvest_200: Option<Decimal>,
    gdd_harvest_210: Option<Decimal>,
    gdd_harvest_220: Option<Decimal>,
}

impl From<ThresholdRow> for VarietyThresholds {
    fn from(row: ThresholdRow) -> Self {
        VarietyThresholds {
            variety_code: row.variety_code,
            flowering: row.gdd_flowering,
            veraison: row.gdd_veraison,
            harvest: [
                row.gdd_harvest_170,
                row.gdd_harvest_180,
                row.gdd_harvest_190,
                row.gdd_harvest_200,
                row.gdd_harvest_210,
                row.gdd_harvest_220,
            ],
        }
    }
}

impl PhenologyService {
    pub fn new(db: PgPool, rate_lookback_days: i64) -> Self {
        Self {
            baseline: BaselineService::new(db.clone()),
            db,
            rate_lookback_days,
        }
    }

    /// Evaluate estimates for every (zone with season data, variety) pair,
    /// upserting exactly one row per composite key
    pub async fn run(
        &self,
        date: Option<NaiveDate>,
        zone: Option<Uuid>,
        variety: Option<&str>,
        dry_run: bool,
    ) -> AppResult<EstimateSummary> {
        let eval_date = date.unwrap_or_else(civil_today);
        let vintage = vintage_year(eval_date);
        let dov = day_of_vintage(eval_date);

        let thresholds = self.load_thresholds(variety).await?;
        if thresholds.is_empty() {
            return Err(AppError::Configuration(
                "no phenology thresholds configured".to_string(),
            ));
        }

        let zones = match zone {
            Some(z) => vec![z],
            None => self.zones_with_season(vintage).await?,
        };

        let mut summary = EstimateSummary {
            zones: zones.len(),
            ..Default::default()
        };

        for zone_id in zones {
            let season = match self.season_snapshot(zone_id, vintage, eval_date).await? {
                Some(season) => season,
                None => {
                    info!(zone = %zone_id, vintage, "no season data yet, skipping zone");
                    summary.zones_without_data += 1;
                    continue;
                }
            };

            let baseline_cumulative = self
                .baseline
                .for_day(zone_id, dov)
                .await?
                .and_then(|b| b.gdd_base0_cumulative_avg);

            for variety_thresholds in &thresholds {
                let assessment = assess(&season, variety_thresholds, baseline_cumulative, eval_date);
                if dry_run {
                    info!(
                        zone = %zone_id,
                        variety = %variety_thresholds.variety_code,
                        stage = assessment.current_stage.code(),
                        gdd = %assessment.gdd_accumulated,
                        "dry run, skipping write"
                    );
                } else {
                    self.upsert_estimate(
                        zone_id,
                        &variety_thresholds.variety_code,
                        vintage,
                        eval_date,
                        &assessment,
                    )
                    .await?;
                }
                summary.estimates += 1;
            }
        }

        Ok(summary)
    }

    async fn load_thresholds(&self, variety: Option<&str>) -> AppResult<Vec<VarietyThresholds>> {
        let rows = sqlx::query_as::<_, ThresholdRow>(
            r#"
            SELECT variety_code, gdd_flowering, gdd_veraison,
                   gdd_harvest_170, gdd_harvest_180, gdd_harvest_190,
                   gdd_harvest_200, gdd_harvest_210, gdd_harvest_220
            FROM phenology_thresholds
            WHERE ($1::text IS NULL OR variety_code = $1)
            ORDER BY variety_code
            "#,
        )
        .bind(variety)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(VarietyThresholds::from).collect())
    }

    async fn zones_with_season(&self, vintage: i32) -> AppResult<Vec<Uuid>> {
        let zones = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT zone_id FROM climate_zone_daily WHERE vintage_year = $1 ORDER BY zone_id",
        )
        .bind(vintage)
        .fetch_all(&self.db)
        .await?;

        Ok(zones)
    }

    /// Season state at the evaluation date, or `None` before the first
    /// aggregated day of the vintage
    async fn season_snapshot(
        &self,
        zone_id: Uuid,
        vintage: i32,
        eval_date: NaiveDate,
    ) -> AppResult<Option<SeasonSnapshot>> {
        let cumulative = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT gdd_base0_cumulative
            FROM climate_zone_daily
            WHERE zone_id = $1 AND vintage_year = $2 AND date <= $3
            ORDER BY date DESC
            LIMIT 1
            "#,
        )
        .bind(zone_id)
        .bind(vintage)
        .bind(eval_date)
        .fetch_optional(&self.db)
        .await?;

        let Some(cumulative_gdd) = cumulative else {
            return Ok(None);
        };

        let window_start = eval_date - Duration::days(self.rate_lookback_days);
        let daily: Vec<Decimal> = sqlx::query_scalar(
            r#"
            SELECT gdd_base0_daily
            FROM climate_zone_daily
            WHERE zone_id = $1 AND vintage_year = $2
              AND date > $3 AND date <= $4
            "#,
        )
        .bind(zone_id)
        .bind(vintage)
        .bind(window_start)
        .bind(eval_date)
        .fetch_all(&self.db)
        .await?;

        Ok(Some(SeasonSnapshot {
            cumulative_gdd,
            trailing_rate: trailing_rate(&daily),
            lookback_days_with_data: daily.len() as i64,
            lookback_days: self.rate_lookback_days,
        }))
    }

    async fn upsert_estimate(
        &self,
        zone_id: Uuid,
        variety_code: &str,
        vintage: i32,
        eval_date: NaiveDate,
        assessment: &PhenologyAssessment,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO phenology_estimates (
                zone_id, variety_code, vintage_year, estimate_date,
                gdd_accumulated, current_stage,
                flowering_date, veraison_date,
                harvest_170_date, harvest_180_date, harvest_190_date,
                harvest_200_date, harvest_210_date, harvest_220_date,
                days_vs_baseline, gdd_vs_baseline, confidence
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (zone_id, variety_code, vintage_year, estimate_date) DO UPDATE SET
                gdd_accumulated = EXCLUDED.gdd_accumulated,
                current_stage = EXCLUDED.current_stage,
                flowering_date = EXCLUDED.flowering_date,
                veraison_date = EXCLUDED.veraison_date,
                harvest_170_date = EXCLUDED.harvest_170_date,
                harvest_180_date = EXCLUDED.harvest_180_date,
                harvest_190_date = EXCLUDED.harvest_190_date,
                harvest_200_date = EXCLUDED.harvest_200_date,
                harvest_210_date = EXCLUDED.harvest_210_date,
                harvest_220_date = EXCLUDED.harvest_220_date,
                days_vs_baseline = EXCLUDED.days_vs_baseline,
                gdd_vs_baseline = EXCLUDED.gdd_vs_baseline,
                confidence = EXCLUDED.confidence
            "#,
        )
        .bind(zone_id)
        .bind(variety_code)
        .bind(vintage)
        .bind(eval_date)
        .bind(assessment.gdd_accumulated)
        .bind(assessment.current_stage.code())
        .bind(assessment.flowering_date)
        .bind(assessment.veraison_date)
        .bind(assessment.harvest_dates[0])
        .bind(assessment.harvest_dates[1])
        .bind(assessment.harvest_dates[2])
        .bind(assessment.harvest_dates[3])
        .bind(assessment.harvest_dates[4])
        .bind(assessment.harvest_dates[5])
        .bind(assessment.days_vs_baseline)
        .bind(assessment.gdd_vs_baseline)
        .bind(assessment.confidence.code())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
