//! Plausibility checks on decoded readings
//!
//! Only the fields used for immediate alerting are checked. Location, weather
//! codes and the forecast sequences pass through for downstream consumers.
use std::ops::RangeInclusive;

use crate::error::ValidationError;
use crate::reading::WeatherReading;

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -100.0..=100.0;
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Check a reading, reporting the first failed check
pub fn validate(reading: &WeatherReading) -> Result<(), ValidationError> {
    let current = &reading.current;

    if reading.timestamp.is_empty() {
        return Err(ValidationError::EmptyTimestamp);
    }
    if !TEMPERATURE_RANGE.contains(&current.temperature) {
        return Err(ValidationError::TemperatureOutOfRange(current.temperature));
    }
    if !HUMIDITY_RANGE.contains(&current.humidity) {
        return Err(ValidationError::HumidityOutOfRange(current.humidity));
    }
    if current.wind_speed.is_nan() || current.wind_speed < 0.0 {
        return Err(ValidationError::NegativeWindSpeed(current.wind_speed));
    }

    Ok(())
}

pub fn is_valid(reading: &WeatherReading) -> bool {
    validate(reading).is_ok()
}
