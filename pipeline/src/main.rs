//! Vineyard Climate Pipeline - batch entry point
//!
//! Scheduled batch job that ingests provider weather feeds, maintains the
//! canonical observation series, and derives zone-daily climate records,
//! baselines and phenology estimates for the platform to read.

use chrono::Duration;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vineyard_climate_pipeline::cli::{
    AggregateArgs, BaselineCommands, Cli, Commands, IngestArgs, Mode, PhenologyCommands,
    StationCommands,
};
use vineyard_climate_pipeline::config::Config;
use vineyard_climate_pipeline::error::{AppError, AppResult};
use vineyard_climate_pipeline::services::ingest::RunMode;
use vineyard_climate_pipeline::services::{
    BaselineService, IngestionService, PhenologyService, StationService, ZoneAggregationService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vcp=debug,vineyard_climate_pipeline=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load()?;

    tracing::info!("Starting vineyard climate pipeline");
    tracing::info!("Environment: {}", config.environment);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
    }

    // Batches commit atomically, so anything already durable stays valid on
    // cancellation; only in-flight fetches are abandoned.
    tokio::select! {
        result = run_command(cli.command, db_pool, &config) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("cancellation requested, abandoning in-flight work");
        }
    }

    Ok(())
}

async fn run_command(command: Commands, db: PgPool, config: &Config) -> AppResult<()> {
    match command {
        Commands::Ingest(args) => run_ingest(args, db, config).await,
        Commands::Aggregate(args) => run_aggregate(args, db, config).await,
        Commands::Baseline { command } => match command {
            BaselineCommands::Rebuild => {
                BaselineService::new(db).rebuild().await?;
                Ok(())
            }
        },
        Commands::Phenology { command } => match command {
            PhenologyCommands::Run {
                date,
                zone,
                variety,
                dry_run,
            } => {
                let summary = PhenologyService::new(db, config.phenology.rate_lookback_days)
                    .run(date, zone, variety.as_deref(), dry_run)
                    .await?;
                tracing::info!(
                    zones = summary.zones,
                    estimates = summary.estimates,
                    zones_without_data = summary.zones_without_data,
                    "phenology run complete"
                );
                Ok(())
            }
        },
        Commands::Stations { command } => run_stations(command, db).await,
    }
}

async fn run_ingest(args: IngestArgs, db: PgPool, config: &Config) -> AppResult<()> {
    let mode = match args.mode {
        Mode::Incremental => RunMode::Incremental,
        Mode::Backfill => {
            let start = args.start.ok_or_else(|| {
                AppError::Validation("backfill mode requires --start".to_string())
            })?;
            RunMode::Backfill {
                start,
                end: args.end,
            }
        }
    };

    let service = IngestionService::new(db, config)?;
    let summary = service
        .run(args.source, &args.stations, mode, args.dry_run)
        .await?;

    if summary.stations_failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} stations failed during ingestion",
            summary.stations_failed,
            summary.stations_failed + summary.stations_ok
        )
        .into());
    }
    Ok(())
}

async fn run_aggregate(args: AggregateArgs, db: PgPool, config: &Config) -> AppResult<()> {
    let end = args.end.unwrap_or_else(shared::civil_today);
    let start = args.start.unwrap_or(end - Duration::days(1));

    let service =
        ZoneAggregationService::new(db, config.aggregation.high_confidence_min_stations);
    let summary = service.run(args.zone, start, end, args.dry_run).await?;
    tracing::info!(
        zones = summary.zones,
        days_written = summary.days_written,
        days_empty = summary.days_empty,
        "aggregation complete"
    );
    Ok(())
}

async fn run_stations(command: StationCommands, db: PgPool) -> AppResult<()> {
    let service = StationService::new(db);
    match command {
        StationCommands::Import { file } => {
            let summary = service.import_file(&file).await?;
            tracing::info!(
                imported = summary.imported,
                rejected = summary.rejected,
                "station import complete"
            );
            Ok(())
        }
        StationCommands::List { source } => {
            let stations = service.list_all(source).await?;
            for station in stations {
                println!(
                    "{:<20} {:<10} source_id={:<12} zone={} active={}",
                    station.station_code,
                    station.data_source,
                    station.source_id,
                    station
                        .zone_id
                        .map(|z| z.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    station.is_active,
                );
            }
            Ok(())
        }
        StationCommands::AssignZone {
            station_code,
            zone_id,
        } => service.assign_zone(&station_code, zone_id).await,
        StationCommands::Deactivate { station_code } => service.deactivate(&station_code).await,
    }
}
