//! Harvest telemetry client
//!
//! One API call per (station trace, variable) returning a sample envelope
//! that may carry a next-page link; pages are followed until the link is
//! absent, capped to guard against a looping provider, and merged before
//! normalization.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{CanonicalObservation, DataSource, NormalizedBatch, Quality, Variable};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{FetchWindow, RetryPolicy, WINDOW_TIME_FORMAT};

/// Hard cap on pages followed per (trace, variable) call
pub const MAX_TRACE_PAGES: usize = 50;

/// Harvest API client
#[derive(Clone)]
pub struct HarvestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

/// One page of the trace sample envelope
#[derive(Debug, Clone, Deserialize)]
pub struct TracePage {
    pub unit: Option<String>,
    #[serde(default)]
    pub samples: Vec<TraceSample>,
    /// Absolute URL of the next page, absent on the last page
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceSample {
    /// Civil local timestamp, ISO-8601 without offset
    pub at: String,
    /// Numeric in well-formed feeds; kept raw so one bad sample cannot
    /// poison the batch
    pub value: serde_json::Value,
    pub flag: Option<String>,
}

/// Merged result of a full pagination walk
#[derive(Debug, Clone, Default)]
pub struct RawTrace {
    pub unit: Option<String>,
    pub samples: Vec<TraceSample>,
}

/// Trace parameter name for a canonical variable
pub fn trace_param(variable: &Variable) -> Option<&'static str> {
    match variable {
        Variable::Temp => Some("air_temperature"),
        Variable::Humidity => Some("relative_humidity"),
        Variable::Rainfall => Some("rainfall"),
        Variable::SolarRadiation => Some("solar_radiation"),
        _ => None,
    }
}

/// Variables Harvest stations emit
pub fn supported_variables() -> [Variable; 4] {
    [
        Variable::Temp,
        Variable::Humidity,
        Variable::Rainfall,
        Variable::SolarRadiation,
    ]
}

impl HarvestClient {
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

    /// Fetch all pages of raw samples for one (trace, variable, window)
    pub async fn fetch(
        &self,
        trace_id: &str,
        variable: &Variable,
        window: &FetchWindow,
    ) -> AppResult<RawTrace> {
        let param = trace_param(variable).ok_or_else(|| AppError::UnsupportedVariable {
            provider: DataSource::Harvest,
            variable: variable.clone(),
        })?;

        let mut url = format!(
            "{}/traces/{}/{}?from={}&to={}",
            self.base_url,
            trace_id,
            param,
            window.start.format(WINDOW_TIME_FORMAT),
            window.end.format(WINDOW_TIME_FORMAT),
        );
        if let Some(key) = &self.api_key {
            url.push_str("&api_key=");
            url.push_str(key);
        }

        let mut raw = RawTrace::default();
        for page_no in 1..=MAX_TRACE_PAGES {
            let page = self.fetch_page(&url).await?;
            if raw.unit.is_none() {
                raw.unit = page.unit;
            }
            raw.samples.extend(page.samples);

            match page.next {
                None => break,
                Some(next) => {
                    if page_no == MAX_TRACE_PAGES {
                        tracing::warn!(
                            trace_id,
                            param,
                            pages = page_no,
                            "trace pagination hit the page cap, returning partial window"
                        );
                        break;
                    }
                    url = next;
                }
            }
        }
        Ok(raw)
    }

    async fn fetch_page(&self, url: &str) -> AppResult<TracePage> {
        let response = self
            .retry
            .run(|| async {
                let resp = self.client.get(url).send().await?;
                Ok(resp.error_for_status()?)
            })
            .await?;

        let body = response.text().await?;
        parse_page(&body)
    }
}

/// Parse one envelope page
pub fn parse_page(body: &str) -> AppResult<TracePage> {
    serde_json::from_str(body)
        .map_err(|e| AppError::Parse(format!("harvest trace envelope: {}", e)))
}

/// Reduce merged raw samples to canonical observations
///
/// Unparseable timestamps and non-numeric values are dropped and counted.
pub fn normalize(raw: &RawTrace, station_id: Uuid, variable: &Variable) -> NormalizedBatch {
    let unit = raw
        .unit
        .clone()
        .unwrap_or_else(|| variable.default_unit().to_string());

    let mut batch = NormalizedBatch::default();
    for sample in &raw.samples {
        let timestamp = match parse_sample_time(&sample.at) {
            Some(ts) => ts,
            None => {
                batch.skipped += 1;
                continue;
            }
        };
        let value = match decimal_from_json(&sample.value) {
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
            quality: map_flag(sample.flag.as_deref()),
        });
    }
    batch
}

fn parse_sample_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_flag(flag: Option<&str>) -> Quality {
    match flag.map(|f| f.to_ascii_lowercase()).as_deref() {
        None | Some("ok") | Some("good") => Quality::Good,
        Some("interpolated") => Quality::Interpolated,
        Some(_) => Quality::Bad,
    }
}
