//! Hilltop time-series server client
//!
//! One GetData request per (site, measurement, date range). The server
//! answers HTTP 200 for logical failures and embeds an `<Error>` element
//! instead, so responses are checked structurally rather than by status.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{CanonicalObservation, DataSource, NormalizedBatch, Quality, Variable};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{FetchWindow, RetryPolicy, WINDOW_TIME_FORMAT};

/// Rainfall is requested totalised per interval rather than as raw tips
const RAINFALL_INTERVAL: &str = "1 hour";

/// Hilltop API client
#[derive(Clone)]
pub struct HilltopClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HilltopResponse {
    /// Logical error envelope; present means the request failed even though
    /// the transport succeeded
    #[serde(rename = "Error")]
    pub error: Option<String>,
    #[serde(rename = "Measurement")]
    pub measurement: Option<HilltopMeasurement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HilltopMeasurement {
    #[serde(rename = "SiteName", default)]
    pub site_name: String,
    #[serde(rename = "DataSource")]
    pub data_source: Option<HilltopDataSource>,
    #[serde(rename = "Data")]
    pub data: HilltopData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HilltopDataSource {
    #[serde(rename = "ItemInfo")]
    pub item_info: Option<HilltopItemInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HilltopItemInfo {
    #[serde(rename = "Units")]
    pub units: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HilltopData {
    #[serde(rename = "E", default)]
    pub events: Vec<HilltopEvent>,
}

/// One `<E>` event: timestamp plus first item value
#[derive(Debug, Clone, Deserialize)]
pub struct HilltopEvent {
    #[serde(rename = "T")]
    pub t: String,
    #[serde(rename = "I1")]
    pub i1: Option<String>,
}

/// Measurement name and optional aggregation interval per canonical variable
pub fn measurement_for(variable: &Variable) -> Option<(&'static str, Option<&'static str>)> {
    match variable {
        Variable::Temp => Some(("Air Temperature", None)),
        Variable::Humidity => Some(("Relative Humidity", None)),
        Variable::Rainfall => Some(("Rainfall", Some(RAINFALL_INTERVAL))),
        Variable::SolarRadiation => Some(("Solar Radiation", None)),
        _ => None,
    }
}

/// Variables Hilltop sites emit
pub fn supported_variables() -> [Variable; 4] {
    [
        Variable::Temp,
        Variable::Humidity,
        Variable::Rainfall,
        Variable::SolarRadiation,
    ]
}

impl HilltopClient {
    pub fn new(client: reqwest::Client, base_url: String, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url,
            retry,
        }
    }

    /// Fetch raw events for one (site, variable, window)
    pub async fn fetch(
        &self,
        site: &str,
        variable: &Variable,
        window: &FetchWindow,
    ) -> AppResult<HilltopMeasurement> {
        let (measurement, interval) =
            measurement_for(variable).ok_or_else(|| AppError::UnsupportedVariable {
                provider: DataSource::Hilltop,
                variable: variable.clone(),
            })?;

        let from = window.start.format(WINDOW_TIME_FORMAT).to_string();
        let to = window.end.format(WINDOW_TIME_FORMAT).to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("Service", "Hilltop"),
            ("Request", "GetData"),
            ("Site", site),
            ("Measurement", measurement),
            ("From", &from),
            ("To", &to),
        ];
        if let Some(interval) = interval {
            query.push(("Interval", interval));
        }

        let response = self
            .retry
            .run(|| async {
                let resp = self.client.get(&self.base_url).query(&query).send().await?;
                Ok(resp.error_for_status()?)
            })
            .await?;

        let body = response.text().await?;
        parse_response(&body)
    }
}

/// Parse a GetData response, surfacing the embedded error envelope
pub fn parse_response(xml: &str) -> AppResult<HilltopMeasurement> {
    let response: HilltopResponse = serde_xml_rs::from_str(xml)
        .map_err(|e| AppError::Parse(format!("hilltop envelope: {}", e)))?;

    if let Some(message) = response.error {
        return Err(AppError::Provider {
            provider: DataSource::Hilltop,
            message,
        });
    }
    response.measurement.ok_or_else(|| {
        AppError::Parse("hilltop envelope: no Measurement or Error element".to_string())
    })
}

/// Reduce raw events to canonical observations
pub fn normalize(
    measurement: &HilltopMeasurement,
    station_id: Uuid,
    variable: &Variable,
) -> NormalizedBatch {
    let unit = measurement
        .data_source
        .as_ref()
        .and_then(|ds| ds.item_info.as_ref())
        .and_then(|info| info.units.clone())
        .unwrap_or_else(|| variable.default_unit().to_string());

    let mut batch = NormalizedBatch::default();
    for event in &measurement.data.events {
        let timestamp = match parse_event_time(&event.t) {
            Some(ts) => ts,
            None => {
                batch.skipped += 1;
                continue;
            }
        };
        let value = match event.i1.as_deref().and_then(parse_event_value) {
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
            // Hilltop carries no per-event quality flag
            quality: Quality::Good,
        });
    }
    batch
}

fn parse_event_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M:%S"))
        .ok()
}

fn parse_event_value(raw: &str) -> Option<Decimal> {
    raw.trim().parse::<Decimal>().ok()
}
