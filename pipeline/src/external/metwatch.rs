//! Metwatch observations client
//!
//! One request per (site number, variable). The endpoint path depends on
//! the variable and is not discoverable from the site itself, so a static
//! variable→endpoint mapping is consulted; a missing entry means the
//! variable is simply unsupported on this connector.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{civil_offset, CanonicalObservation, DataSource, NormalizedBatch, Quality, Variable};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{FetchWindow, RetryPolicy};

/// Metwatch API client
#[derive(Clone)]
pub struct MetwatchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

/// Response body for one (site, variable) request
#[derive(Debug, Clone, Deserialize)]
pub struct SiteReadings {
    pub unit: Option<String>,
    #[serde(default)]
    pub readings: Vec<SiteReading>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteReading {
    /// Unix epoch seconds
    pub time: i64,
    pub value: serde_json::Value,
    /// Provider QC code: 1 verified, 2 raw, anything higher failed QC
    pub quality: Option<i32>,
}

/// Static variable→endpoint mapping; `None` is the defined "unsupported
/// variable for this connector" outcome, not an error
pub fn endpoint_for(variable: &Variable) -> Option<&'static str> {
    match variable {
        Variable::Temp => Some("observations/air-temperature"),
        Variable::Humidity => Some("observations/humidity"),
        Variable::Rainfall => Some("observations/rain"),
        Variable::Pressure => Some("observations/pressure"),
        _ => None,
    }
}

/// Variables with a mapped endpoint
pub fn supported_variables() -> [Variable; 4] {
    [
        Variable::Temp,
        Variable::Humidity,
        Variable::Rainfall,
        Variable::Pressure,
    ]
}

impl MetwatchClient {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            retry,
        }
    }

    /// Fetch raw readings for one (site number, variable, window)
    pub async fn fetch(
        &self,
        site_number: &str,
        variable: &Variable,
        window: &FetchWindow,
    ) -> AppResult<SiteReadings> {
        let endpoint = endpoint_for(variable).ok_or_else(|| AppError::UnsupportedVariable {
            provider: DataSource::Metwatch,
            variable: variable.clone(),
        })?;

        let mut url = format!(
            "{}/{}/{}?from={}&to={}",
            self.base_url,
            endpoint,
            site_number,
            to_epoch(window.start),
            to_epoch(window.end),
        );
        if let Some(key) = &self.api_key {
            url.push_str("&key=");
            url.push_str(key);
        }

        let response = self
            .retry
            .run(|| async {
                let resp = self.client.get(&url).send().await?;
                Ok(resp.error_for_status()?)
            })
            .await?;

        let body = response.text().await?;
        parse_readings(&body)
    }
}

/// Parse one site-readings body
pub fn parse_readings(body: &str) -> AppResult<SiteReadings> {
    serde_json::from_str(body)
        .map_err(|e| AppError::Parse(format!("metwatch readings body: {}", e)))
}

/// Reduce raw readings to canonical observations
pub fn normalize(raw: &SiteReadings, station_id: Uuid, variable: &Variable) -> NormalizedBatch {
    let unit = raw
        .unit
        .clone()
        .unwrap_or_else(|| variable.default_unit().to_string());

    let mut batch = NormalizedBatch::default();
    for reading in &raw.readings {
        let timestamp = match from_epoch(reading.time) {
            Some(ts) => ts,
            None => {
                batch.skipped += 1;
                continue;
            }
        };
        let value = match decimal_from_json(&reading.value) {
            Some(v) => v,
            None => {
                batch.skipped += 1;
                continue;
            }
        };
        batch.observations.push(CanonicalObservation {
            station_id,
            timestamp,
            variable: variable.clone(),
            value,
            unit: unit.clone(),
            quality: map_quality(reading.quality),
        });
    }
    batch
}

/// Epoch seconds for a civil timestamp; the fixed offset has no DST gaps
fn to_epoch(civil: NaiveDateTime) -> i64 {
    civil_offset()
        .from_local_datetime(&civil)
        .single()
        .expect("fixed offset maps every civil time")
        .timestamp()
}

/// Civil timestamp for epoch seconds
fn from_epoch(epoch: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(epoch, 0).map(|utc| utc.with_timezone(&civil_offset()).naive_local())
}

fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_quality(code: Option<i32>) -> Quality {
    match code {
        None | Some(1) | Some(2) => Quality::Good,
        Some(_) => Quality::Bad,
    }
}
