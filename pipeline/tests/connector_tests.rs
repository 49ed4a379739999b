//! Connector and normalization tests
//!
//! Exercises each provider's typed payload parsing, the malformed-record
//! skip policy, and the bounded retry combinator, all without network I/O.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{Quality, Variable};
use vineyard_climate_pipeline::error::AppError;
use vineyard_climate_pipeline::external::{harvest, hilltop, metwatch};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn station() -> Uuid {
    Uuid::from_u128(0x11d9_c0de)
}

// ============================================================================
// Harvest (paginated JSON envelope)
// ============================================================================

#[cfg(test)]
mod harvest_tests {
    use super::*;

    #[test]
    fn parses_envelope_with_next_link() {
        let body = r#"{
            "unit": "degC",
            "samples": [
                {"at": "2025-01-10T09:00:00", "value": 18.4, "flag": "ok"},
                {"at": "2025-01-10T09:15:00", "value": 18.6}
            ],
            "next": "https://data.example.nz/api/traces/t1/air_temperature?page=2"
        }"#;

        let page = harvest::parse_page(body).unwrap();
        assert_eq!(page.samples.len(), 2);
        assert_eq!(page.unit.as_deref(), Some("degC"));
        assert!(page.next.is_some());
    }

    #[test]
    fn last_page_has_no_next_link() {
        let body = r#"{"samples": [], "next": null}"#;
        let page = harvest::parse_page(body).unwrap();
        assert!(page.next.is_none());
        assert!(page.samples.is_empty());
    }

    #[test]
    fn malformed_envelope_is_a_parse_error() {
        assert!(matches!(
            harvest::parse_page("<html>gateway error</html>"),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn normalize_maps_flags_and_units() {
        let body = r#"{
            "unit": "degC",
            "samples": [
                {"at": "2025-01-10T09:00:00", "value": 18.4, "flag": "ok"},
                {"at": "2025-01-10T09:15:00", "value": 18.6, "flag": "suspect"},
                {"at": "2025-01-10T09:30:00", "value": 18.5, "flag": "interpolated"}
            ]
        }"#;
        let page = harvest::parse_page(body).unwrap();
        let raw = harvest::RawTrace {
            unit: page.unit,
            samples: page.samples,
        };

        let batch = harvest::normalize(&raw, station(), &Variable::Temp);
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.observations.len(), 3);
        assert_eq!(batch.observations[0].quality, Quality::Good);
        assert_eq!(batch.observations[1].quality, Quality::Bad);
        assert_eq!(batch.observations[2].quality, Quality::Interpolated);
        assert!(batch.observations.iter().all(|o| o.unit == "degC"));
    }

    #[test]
    fn normalize_skips_malformed_records_without_aborting() {
        let body = r#"{
            "samples": [
                {"at": "not-a-timestamp", "value": 18.4},
                {"at": "2025-01-10T09:15:00", "value": "n/a"},
                {"at": "2025-01-10T09:30:00", "value": "18.9"}
            ]
        }"#;
        let page = harvest::parse_page(body).unwrap();
        let raw = harvest::RawTrace {
            unit: None,
            samples: page.samples,
        };

        let batch = harvest::normalize(&raw, station(), &Variable::Temp);
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.observations.len(), 1);
        // string-encoded numerics still parse
        assert_eq!(batch.observations[0].value, dec("18.9"));
        // default unit applies when the provider declares none
        assert_eq!(batch.observations[0].unit, "degC");
    }

    #[test]
    fn trace_param_is_a_closed_mapping() {
        assert_eq!(harvest::trace_param(&Variable::Temp), Some("air_temperature"));
        assert_eq!(harvest::trace_param(&Variable::Pressure), None);
        assert_eq!(
            harvest::trace_param(&Variable::Other("leaf_wetness".to_string())),
            None
        );
    }
}

// ============================================================================
// Hilltop (XML time series with embedded error envelope)
// ============================================================================

#[cfg(test)]
mod hilltop_tests {
    use super::*;

    const GOOD_RESPONSE: &str = r#"<?xml version="1.0"?>
<HilltopResponse>
  <Measurement SiteName="Awatere Valley">
    <DataSource>
      <ItemInfo>
        <Units>degC</Units>
      </ItemInfo>
    </DataSource>
    <Data>
      <E><T>2025-01-10T09:00:00</T><I1>18.4</I1></E>
      <E><T>2025-01-10T10:00:00</T><I1>19.1</I1></E>
    </Data>
  </Measurement>
</HilltopResponse>"#;

    #[test]
    fn parses_measurement_events() {
        let measurement = hilltop::parse_response(GOOD_RESPONSE).unwrap();
        assert_eq!(measurement.site_name, "Awatere Valley");
        assert_eq!(measurement.data.events.len(), 2);
    }

    #[test]
    fn error_envelope_is_detected_structurally() {
        // HTTP 200 with a logical error body
        let body = r#"<?xml version="1.0"?>
<HilltopResponse>
  <Error>Site not found: XYZ</Error>
</HilltopResponse>"#;

        match hilltop::parse_response(body) {
            Err(AppError::Provider { message, .. }) => {
                assert!(message.contains("Site not found"));
            }
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn response_without_measurement_or_error_is_malformed() {
        let body = r#"<?xml version="1.0"?><HilltopResponse></HilltopResponse>"#;
        assert!(matches!(
            hilltop::parse_response(body),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn normalize_reads_units_and_skips_bad_events() {
        let body = r#"<?xml version="1.0"?>
<HilltopResponse>
  <Measurement SiteName="Awatere Valley">
    <DataSource>
      <ItemInfo><Units>mm</Units></ItemInfo>
    </DataSource>
    <Data>
      <E><T>2025-01-10T09:00:00</T><I1>0.5</I1></E>
      <E><T>garbled</T><I1>0.5</I1></E>
      <E><T>2025-01-10T11:00:00</T><I1>abc</I1></E>
      <E><T>2025-01-10T12:00:00</T></E>
    </Data>
  </Measurement>
</HilltopResponse>"#;

        let measurement = hilltop::parse_response(body).unwrap();
        let batch = hilltop::normalize(&measurement, station(), &Variable::Rainfall);
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(batch.skipped, 3);
        assert_eq!(batch.observations[0].unit, "mm");
        assert_eq!(batch.observations[0].value, dec("0.5"));
        assert_eq!(batch.observations[0].quality, Quality::Good);
    }

    #[test]
    fn measurement_mapping_is_closed() {
        assert!(hilltop::measurement_for(&Variable::Temp).is_some());
        assert!(hilltop::measurement_for(&Variable::Pressure).is_none());
        // rainfall is requested totalised per interval
        let (name, interval) = hilltop::measurement_for(&Variable::Rainfall).unwrap();
        assert_eq!(name, "Rainfall");
        assert!(interval.is_some());
    }
}

// ============================================================================
// Metwatch (JSON per variable, epoch timestamps)
// ============================================================================

#[cfg(test)]
mod metwatch_tests {
    use super::*;

    #[test]
    fn endpoint_mapping_miss_means_unsupported_not_error() {
        assert!(metwatch::endpoint_for(&Variable::Temp).is_some());
        assert!(metwatch::endpoint_for(&Variable::SolarRadiation).is_none());
        assert!(metwatch::endpoint_for(&Variable::Other("soil_moisture".to_string())).is_none());
    }

    #[test]
    fn normalize_converts_epochs_to_civil_time() {
        // 2025-01-09T20:00:00Z == 2025-01-10T08:00:00 at UTC+12
        let body = r#"{
            "unit": "degC",
            "readings": [
                {"time": 1736452800, "value": 18.4, "quality": 1}
            ]
        }"#;

        let raw = metwatch::parse_readings(body).unwrap();
        let batch = metwatch::normalize(&raw, station(), &Variable::Temp);
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(
            batch.observations[0].timestamp.date(),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
        );
        assert_eq!(batch.observations[0].timestamp.time().to_string(), "08:00:00");
    }

    #[test]
    fn quality_codes_map_onto_canonical_flags() {
        let body = r#"{
            "readings": [
                {"time": 1736452800, "value": 18.4, "quality": 1},
                {"time": 1736456400, "value": 18.5, "quality": 2},
                {"time": 1736460000, "value": 18.6, "quality": 151},
                {"time": 1736463600, "value": 18.7}
            ]
        }"#;

        let raw = metwatch::parse_readings(body).unwrap();
        let batch = metwatch::normalize(&raw, station(), &Variable::Temp);
        let qualities: Vec<Quality> = batch.observations.iter().map(|o| o.quality).collect();
        assert_eq!(
            qualities,
            vec![Quality::Good, Quality::Good, Quality::Bad, Quality::Good]
        );
    }

    #[test]
    fn non_numeric_values_are_counted_and_dropped() {
        let body = r#"{
            "readings": [
                {"time": 1736452800, "value": null},
                {"time": 1736456400, "value": "12.25"}
            ]
        }"#;

        let raw = metwatch::parse_readings(body).unwrap();
        let batch = metwatch::normalize(&raw, station(), &Variable::Rainfall);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(batch.observations[0].value, dec("12.25"));
    }
}

// ============================================================================
// Retry combinator
// ============================================================================

#[cfg(test)]
mod retry_tests {
    use super::*;
    use shared::DataSource;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use vineyard_climate_pipeline::external::RetryPolicy;

    /// A real transport error from a port nothing listens on
    async fn transient_error() -> AppError {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        reqwest::get(format!("http://127.0.0.1:{}/", port))
            .await
            .expect_err("closed port must refuse")
            .into()
    }

    #[tokio::test]
    async fn transient_errors_retry_up_to_the_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), AppError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient_error().await) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn logical_provider_errors_never_retry() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), AppError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AppError::Provider {
                        provider: DataSource::Hilltop,
                        message: "Site not found".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_stops_retrying() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32, AppError> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            })
            .await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
