//! Canonical time-series observation models

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Quality, Variable};

/// One normalized reading, keyed by (station, timestamp, variable)
///
/// Every provider payload is reduced to this tuple before anything touches
/// the database. Timestamps are on the fixed civil calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalObservation {
    pub station_id: Uuid,
    pub timestamp: NaiveDateTime,
    pub variable: Variable,
    pub value: Decimal,
    pub unit: String,
    pub quality: Quality,
}

/// Outcome of normalizing one raw provider response
///
/// Malformed records are dropped and counted, never fatal to the batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<CanonicalObservation>,
    pub skipped: usize,
}

impl NormalizedBatch {
    pub fn merge(&mut self, other: NormalizedBatch) {
        self.observations.extend(other.observations);
        self.skipped += other.skipped;
    }
}
