//! Phenological stage model
//!
//! Stage boundaries are GDD thresholds (base 0 °C, accumulated from 1 July)
//! per grape variety. Harvest readiness is a family of thresholds at rising
//! sugar levels (°Brix × 10: 17.0 through 22.0).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Phenological stages in development order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreFlowering,
    Flowering,
    Veraison,
    Ripening,
    HarvestReady,
}

impl Stage {
    pub fn code(&self) -> &'static str {
        match self {
            Stage::PreFlowering => "pre_flowering",
            Stage::Flowering => "flowering",
            Stage::Veraison => "veraison",
            Stage::Ripening => "ripening",
            Stage::HarvestReady => "harvest_ready",
        }
    }
}

/// Sugar levels the harvest threshold family covers (°Brix × 10)
pub const HARVEST_SUGAR_LEVELS: [u16; 6] = [170, 180, 190, 200, 210, 220];

/// Per-variety GDD thresholds
///
/// Any threshold may be absent; an unconfigured boundary is skipped by the
/// stage machine rather than treated as zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VarietyThresholds {
    pub variety_code: String,
    pub flowering: Option<Decimal>,
    pub veraison: Option<Decimal>,
    /// Parallel to [`HARVEST_SUGAR_LEVELS`]
    pub harvest: [Option<Decimal>; 6],
}

impl VarietyThresholds {
    /// Lowest configured harvest threshold, the end of the véraison window
    pub fn first_harvest(&self) -> Option<Decimal> {
        self.harvest.iter().flatten().copied().min()
    }

    /// Highest configured harvest threshold, the boundary into `HarvestReady`
    pub fn last_harvest(&self) -> Option<Decimal> {
        self.harvest.iter().flatten().copied().max()
    }
}
