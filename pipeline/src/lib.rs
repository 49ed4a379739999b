//! Vineyard climate ingestion and forecasting pipeline
//!
//! Library surface of the `vcp` batch binary: provider clients, the
//! canonical time-series writer, zone aggregation, historical baselines,
//! and phenology forecasting.

pub mod cli;
pub mod config;
pub mod error;
pub mod external;
pub mod services;

pub use config::Config;
