//! CLI surface for the pipeline binary
//!
//! Every data-producing step takes an explicit mode (incremental vs
//! backfill), optional date bounds, and a `--dry-run` flag that walks the
//! full fetch/normalize/compute path without persisting.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use shared::DataSource;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vcp")]
#[command(about = "Vineyard climate ingestion and forecasting pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, normalize and store provider observations
    Ingest(IngestArgs),

    /// Recompute zone-daily climate records and GDD accumulation
    Aggregate(AggregateArgs),

    /// Historical climatology baseline jobs
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },

    /// Phenological stage estimates
    Phenology {
        #[command(subcommand)]
        command: PhenologyCommands,
    },

    /// Weather station administration
    Stations {
        #[command(subcommand)]
        command: StationCommands,
    },
}

#[derive(Args)]
pub struct IngestArgs {
    /// Provider to ingest from; all providers when omitted
    #[arg(short, long, value_parser = parse_source)]
    pub source: Option<DataSource>,

    /// Restrict the run to specific station codes
    #[arg(long, value_delimiter = ',')]
    pub stations: Vec<String>,

    /// Window selection: incremental resumes from the watermark, backfill
    /// uses the explicit date range
    #[arg(long, value_enum, default_value_t = Mode::Incremental)]
    pub mode: Mode,

    /// Backfill window start (YYYY-MM-DD), required in backfill mode
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// Backfill window end (YYYY-MM-DD), inclusive; defaults to today
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,

    /// Fetch and normalize without persisting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct AggregateArgs {
    /// Restrict to one climate zone
    #[arg(long, value_parser = parse_uuid)]
    pub zone: Option<Uuid>,

    /// First date to recompute (YYYY-MM-DD); defaults to yesterday
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// Last date to recompute (YYYY-MM-DD), inclusive; defaults to today
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,

    /// Compute aggregates without persisting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum BaselineCommands {
    /// Rebuild the per-(zone, day-of-vintage) climatology from history
    Rebuild,
}

#[derive(Subcommand)]
pub enum PhenologyCommands {
    /// Evaluate stage estimates for every zone/variety pair
    Run {
        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Restrict to one climate zone
        #[arg(long, value_parser = parse_uuid)]
        zone: Option<Uuid>,

        /// Restrict to one variety code
        #[arg(long)]
        variety: Option<String>,

        /// Compute estimates without persisting anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum StationCommands {
    /// One-time station setup from a CSV export
    Import {
        /// CSV file with station_code,data_source,source_id,latitude,...
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List configured stations
    List {
        /// Restrict to one provider
        #[arg(short, long, value_parser = parse_source)]
        source: Option<DataSource>,
    },

    /// Assign a station to a climate zone
    AssignZone {
        station_code: String,
        #[arg(value_parser = parse_uuid)]
        zone_id: Uuid,
    },

    /// Deactivate a station (stations are never deleted)
    Deactivate { station_code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Incremental,
    Backfill,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Incremental => f.write_str("incremental"),
            Mode::Backfill => f.write_str("backfill"),
        }
    }
}

fn parse_source(s: &str) -> Result<DataSource, String> {
    s.parse()
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn parse_uuid(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("invalid UUID '{}': {}", s, e))
}
