//! Validation for operator-supplied reference data
//!
//! Station rows arrive from setup imports; everything else the pipeline
//! touches is machine-generated and validated structurally at parse time.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::types::DataSource;

/// One station row from an operator import file
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StationImport {
    #[validate(custom = "validate_station_code")]
    pub station_code: String,
    pub data_source: DataSource,
    #[validate(length(min = 1, max = 64))]
    pub source_id: String,
    #[validate(custom = "validate_latitude")]
    pub latitude: Decimal,
    #[validate(custom = "validate_longitude")]
    pub longitude: Decimal,
    pub elevation: Option<Decimal>,
    pub zone_id: Option<Uuid>,
    pub region: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

/// Station code format: 3-32 chars, uppercase alphanumeric plus `_`/`-`
pub fn validate_station_code(code: &str) -> Result<(), ValidationError> {
    if code.len() < 3 || code.len() > 32 {
        return Err(ValidationError::new("station_code_length"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::new("station_code_charset"));
    }
    Ok(())
}

pub fn validate_latitude(latitude: &Decimal) -> Result<(), ValidationError> {
    if *latitude < Decimal::from(-90) || *latitude > Decimal::from(90) {
        return Err(ValidationError::new("latitude_out_of_range"));
    }
    Ok(())
}

pub fn validate_longitude(longitude: &Decimal) -> Result<(), ValidationError> {
    if *longitude < Decimal::from(-180) || *longitude > Decimal::from(180) {
        return Err(ValidationError::new("longitude_out_of_range"));
    }
    Ok(())
}
