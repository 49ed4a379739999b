//! Ingestion orchestration
//!
//! One scheduled run walks every active station of the selected providers,
//! computes a fetch window per variable from the derived watermark, invokes
//! the provider client and its normalizer, and hands the merged batch to
//! the time-series writer. Station failures are isolated: each station gets
//! exactly one audit row and the run continues.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared::{civil_now, DataSource, NormalizedBatch, Variable};

use crate::config::{Config, IngestionConfig, ProvidersConfig};
use crate::error::{AppError, AppResult};
use crate::external::{
    build_http_client, harvest, hilltop, metwatch, FetchWindow, HarvestClient, HilltopClient,
    MetwatchClient, RetryPolicy,
};
use crate::services::observations::ObservationStore;
use crate::services::stations::{StationService, WeatherStation};

/// Window selection for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resume each (station, variable) from its watermark
    Incremental,
    /// Operator-specified historical range, overriding the watermark
    Backfill {
        start: NaiveDate,
        /// Inclusive; defaults to today
        end: Option<NaiveDate>,
    },
}

/// Outcome of one station's ingestion
#[derive(Debug, Clone)]
pub struct StationReport {
    pub station_code: String,
    pub success: bool,
    pub processed: u64,
    pub inserted: u64,
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stations_ok: usize,
    pub stations_failed: usize,
    pub records_processed: u64,
    pub records_inserted: u64,
}

/// Ingestion orchestrator
#[derive(Clone)]
pub struct IngestionService {
    stations: StationService,
    store: ObservationStore,
    harvest: HarvestClient,
    hilltop: HilltopClient,
    metwatch: MetwatchClient,
    providers: ProvidersConfig,
    ingestion: IngestionConfig,
    db: PgPool,
}

impl IngestionService {
    pub fn new(db: PgPool, config: &Config) -> AppResult<Self> {
        let http = build_http_client(std::time::Duration::from_secs(
            config.ingestion.http_timeout_secs,
        ))?;
        let retry = RetryPolicy::new(
            config.ingestion.max_retries,
            std::time::Duration::from_millis(config.ingestion.retry_base_ms),
        );

        Ok(Self {
            stations: StationService::new(db.clone()),
            store: ObservationStore::new(db.clone()),
            harvest: HarvestClient::new(
                http.clone(),
                config.providers.harvest.base_url.clone(),
                config.providers.harvest.api_key.clone(),
                retry,
            ),
            hilltop: HilltopClient::new(
                http.clone(),
                config.providers.hilltop.base_url.clone(),
                retry,
            ),
            metwatch: MetwatchClient::new(
                http,
                config.providers.metwatch.base_url.clone(),
                config.providers.metwatch.api_key.clone(),
                retry,
            ),
            providers: config.providers.clone(),
            ingestion: config.ingestion.clone(),
            db,
        })
    }

    /// Run ingestion across providers with a bounded worker pool.
    ///
    /// Stations fan out in parallel; all variables of one station stay on
    /// one worker, so writes for the same (station, variable) are never
    /// concurrent.
    pub async fn run(
        &self,
        source: Option<DataSource>,
        station_codes: &[String],
        mode: RunMode,
        dry_run: bool,
    ) -> AppResult<RunSummary> {
        let sources: Vec<DataSource> = match source {
            Some(s) => vec![s],
            None => DataSource::all().to_vec(),
        };

        let mut summary = RunSummary::default();
        for source in sources {
            let mut stations = self.stations.list_active(Some(source)).await?;
            if !station_codes.is_empty() {
                stations.retain(|s| station_codes.contains(&s.station_code));
            }
            if stations.is_empty() {
                info!(source = %source, "no active stations, nothing to do");
                continue;
            }
            info!(source = %source, stations = stations.len(), dry_run, "starting ingestion");

            let reports: Vec<StationReport> = futures::stream::iter(
                stations.into_iter().map(|station| {
                    let svc = self.clone();
                    async move { svc.ingest_station(source, station, mode, dry_run).await }
                }),
            )
            .buffer_unordered(self.ingestion.workers.max(1))
            .collect()
            .await;

            let mut source_summary = RunSummary::default();
            for report in reports {
                if report.success {
                    source_summary.stations_ok += 1;
                } else {
                    source_summary.stations_failed += 1;
                }
                source_summary.records_processed += report.processed;
                source_summary.records_inserted += report.inserted;
            }

            info!(
                source = %source,
                ok = source_summary.stations_ok,
                failed = source_summary.stations_failed,
                processed = source_summary.records_processed,
                inserted = source_summary.records_inserted,
                "ingestion finished"
            );

            summary.stations_ok += source_summary.stations_ok;
            summary.stations_failed += source_summary.stations_failed;
            summary.records_processed += source_summary.records_processed;
            summary.records_inserted += source_summary.records_inserted;
        }

        Ok(summary)
    }

    /// Ingest all variables of one station, recording one audit row.
    ///
    /// Counts are summed across the station's variables; the whole batch
    /// upserts in one transaction, so a crash never leaves partial data
    /// with an advanced watermark.
    async fn ingest_station(
        &self,
        source: DataSource,
        station: WeatherStation,
        mode: RunMode,
        dry_run: bool,
    ) -> StationReport {
        let started = Utc::now();
        let mut processed = 0u64;
        let mut inserted = 0u64;

        let outcome: AppResult<()> = async {
            let mut batch = NormalizedBatch::default();

            for variable in variables_for(source) {
                let window = match self.window_for(&station, &variable, mode).await? {
                    Some(window) => window,
                    None => continue,
                };

                let normalized = match self
                    .fetch_normalized(source, &station, &variable, &window)
                    .await
                {
                    Ok(normalized) => normalized,
                    Err(AppError::UnsupportedVariable { provider, variable }) => {
                        debug!(%provider, %variable, "variable not supported, skipping");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                processed += (normalized.observations.len() + normalized.skipped) as u64;
                batch.merge(normalized);
            }

            if batch.skipped > 0 {
                warn!(
                    station = %station.station_code,
                    skipped = batch.skipped,
                    "dropped malformed records during normalization"
                );
            }

            if dry_run {
                info!(
                    station = %station.station_code,
                    records = batch.observations.len(),
                    "dry run, skipping persistence"
                );
            } else {
                inserted = self.store.upsert_batch(&batch.observations).await?;
            }
            Ok(())
        }
        .await;

        let success = outcome.is_ok();
        let error_msg = outcome.err().map(|e| e.to_string());
        if let Some(message) = &error_msg {
            error!(station = %station.station_code, error = %message, "station ingestion failed");
        }

        if !dry_run {
            if let Err(e) = self
                .record_run(
                    source,
                    station.station_id,
                    started,
                    processed,
                    inserted,
                    success,
                    error_msg,
                )
                .await
            {
                error!(station = %station.station_code, error = %e, "failed to write audit row");
            }
        }

        StationReport {
            station_code: station.station_code,
            success,
            processed,
            inserted,
        }
    }

    /// Fetch window for one (station, variable), or `None` for a no-op.
    ///
    /// Incremental windows run from the watermark (or the fixed lookback on
    /// first contact) to now minus the provider's publication delay. An
    /// empty or inverted window is the normal steady state on frequent runs.
    async fn window_for(
        &self,
        station: &WeatherStation,
        variable: &Variable,
        mode: RunMode,
    ) -> AppResult<Option<FetchWindow>> {
        let window = match mode {
            RunMode::Backfill { start, end } => {
                backfill_window(start, end.unwrap_or_else(shared::civil_today))
            }
            RunMode::Incremental => {
                let watermark = self.store.watermark(station.station_id, variable).await?;
                let delay = self
                    .providers
                    .for_source(station.source()?)
                    .publication_delay_hours;
                compute_window(watermark, civil_now(), delay, self.ingestion.lookback_hours)
            }
        };

        if window.is_empty() {
            debug!(
                station = %station.station_code,
                variable = %variable,
                "window already ingested, no-op"
            );
            return Ok(None);
        }
        Ok(Some(window))
    }

    async fn fetch_normalized(
        &self,
        source: DataSource,
        station: &WeatherStation,
        variable: &Variable,
        window: &FetchWindow,
    ) -> AppResult<NormalizedBatch> {
        match source {
            DataSource::Harvest => {
                let raw = self
                    .harvest
                    .fetch(&station.source_id, variable, window)
                    .await?;
                Ok(harvest::normalize(&raw, station.station_id, variable))
            }
            DataSource::Hilltop => {
                let raw = self
                    .hilltop
                    .fetch(&station.source_id, variable, window)
                    .await?;
                Ok(hilltop::normalize(&raw, station.station_id, variable))
            }
            DataSource::Metwatch => {
                let raw = self
                    .metwatch
                    .fetch(&station.source_id, variable, window)
                    .await?;
                Ok(metwatch::normalize(&raw, station.station_id, variable))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_run(
        &self,
        source: DataSource,
        station_id: Uuid,
        started: chrono::DateTime<Utc>,
        processed: u64,
        inserted: u64,
        success: bool,
        error_msg: Option<String>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_log (
                data_source, station_id, start_time, end_time,
                records_processed, records_inserted, status, error_msg
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(source.code())
        .bind(station_id)
        .bind(started)
        .bind(Utc::now())
        .bind(processed as i64)
        .bind(inserted as i64)
        .bind(if success { "success" } else { "failed" })
        .bind(error_msg)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Variables a provider's stations emit
pub fn variables_for(source: DataSource) -> Vec<Variable> {
    match source {
        DataSource::Harvest => harvest::supported_variables().to_vec(),
        DataSource::Hilltop => hilltop::supported_variables().to_vec(),
        DataSource::Metwatch => metwatch::supported_variables().to_vec(),
    }
}

/// Incremental fetch window: [watermark | now − lookback, now − delay)
pub fn compute_window(
    watermark: Option<NaiveDateTime>,
    now: NaiveDateTime,
    publication_delay_hours: i64,
    lookback_hours: i64,
) -> FetchWindow {
    let end = now - Duration::hours(publication_delay_hours);
    let start = watermark.unwrap_or(now - Duration::hours(lookback_hours));
    FetchWindow { start, end }
}

/// Backfill window covering the inclusive [start, end] date range
pub fn backfill_window(start: NaiveDate, end: NaiveDate) -> FetchWindow {
    FetchWindow {
        start: start.and_time(NaiveTime::MIN),
        end: (end + Duration::days(1)).and_time(NaiveTime::MIN),
    }
}
