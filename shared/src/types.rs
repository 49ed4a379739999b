//! Common types used across the platform

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weather data providers the pipeline ingests from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Harvest,
    Hilltop,
    Metwatch,
}

impl DataSource {
    pub fn code(&self) -> &'static str {
        match self {
            DataSource::Harvest => "harvest",
            DataSource::Hilltop => "hilltop",
            DataSource::Metwatch => "metwatch",
        }
    }

    pub fn all() -> [DataSource; 3] {
        [DataSource::Harvest, DataSource::Hilltop, DataSource::Metwatch]
    }
}

impl std::str::FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "harvest" => Ok(DataSource::Harvest),
            "hilltop" => Ok(DataSource::Hilltop),
            "metwatch" => Ok(DataSource::Metwatch),
            other => Err(format!("unknown data source: {}", other)),
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical climate variables tracked by the pipeline
///
/// Provider field names map onto this set; fields with no canonical
/// counterpart pass through as `Other` with the lowercased raw name so
/// nothing is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Variable {
    Temp,
    Humidity,
    Rainfall,
    SolarRadiation,
    Pressure,
    Other(String),
}

impl Variable {
    pub fn canonical_name(&self) -> &str {
        match self {
            Variable::Temp => "temp",
            Variable::Humidity => "humidity",
            Variable::Rainfall => "rainfall",
            Variable::SolarRadiation => "solar_radiation",
            Variable::Pressure => "pressure",
            Variable::Other(name) => name,
        }
    }

    /// Unit attached when the provider does not declare one
    pub fn default_unit(&self) -> &'static str {
        match self {
            Variable::Temp => "degC",
            Variable::Humidity => "%",
            Variable::Rainfall => "mm",
            Variable::SolarRadiation => "W/m2",
            Variable::Pressure => "hPa",
            Variable::Other(_) => "",
        }
    }

    /// Map a provider field/measurement name to a canonical variable
    pub fn from_provider_field(field: &str) -> Variable {
        let lower = field.trim().to_ascii_lowercase();
        match lower.as_str() {
            "temp" | "temperature" | "air temperature" | "air_temperature" | "airtemp" => {
                Variable::Temp
            }
            "humidity" | "rh" | "relative humidity" | "relative_humidity" => Variable::Humidity,
            "rainfall" | "rain" | "precipitation" | "total rainfall" => Variable::Rainfall,
            "solar_radiation" | "solar radiation" | "solar" | "radiation" => {
                Variable::SolarRadiation
            }
            "pressure" | "barometric pressure" | "barometric_pressure" | "baro" => {
                Variable::Pressure
            }
            _ => Variable::Other(lower.replace(' ', "_")),
        }
    }
}

impl From<String> for Variable {
    fn from(s: String) -> Self {
        Variable::from_provider_field(&s)
    }
}

impl From<Variable> for String {
    fn from(v: Variable) -> Self {
        v.canonical_name().to_string()
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Quality flag on a canonical observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Good,
    Bad,
    Interpolated,
}

impl Quality {
    pub fn code(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Bad => "bad",
            Quality::Interpolated => "interpolated",
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(Quality::Good),
            "bad" => Ok(Quality::Bad),
            "interpolated" => Ok(Quality::Interpolated),
            other => Err(format!("unknown quality flag: {}", other)),
        }
    }
}

/// Confidence label on derived records, from station coverage or
/// trailing-window coverage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn code(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Offset of the civil calendar all observations are normalized to.
///
/// The source feeds report New Zealand local civil time; the pipeline keeps
/// a fixed UTC+12 offset with no DST adjustment so every timestamp lands on
/// one unambiguous calendar.
pub const CIVIL_OFFSET_HOURS: i32 = 12;

pub fn civil_offset() -> FixedOffset {
    FixedOffset::east_opt(CIVIL_OFFSET_HOURS * 3600).expect("static offset is in range")
}

/// Current instant on the civil calendar
pub fn civil_now() -> NaiveDateTime {
    Utc::now().with_timezone(&civil_offset()).naive_local()
}

/// Current date on the civil calendar
pub fn civil_today() -> NaiveDate {
    civil_now().date()
}
