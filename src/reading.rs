//! Weather reading records as they travel over the queue and to the sink
//!
//! The same JSON shape is used for the incoming message body and the outgoing
//! sink payload. Every field may be omitted or `null` on the wire and then
//! takes its zero value, as may individual `null` entries of the forecast
//! sequences. A field that is present with the wrong type is a decode error.
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;

/// A single weather reading, immutable once decoded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeatherReading {
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(deserialize_with = "null_as_default")]
    pub current: CurrentConditions,
    #[serde(deserialize_with = "null_as_default")]
    pub forecast: HourlyForecast,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_forecast: Option<DailyForecast>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(deserialize_with = "null_as_default")]
    pub latitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub longitude: f64,
}

/// Current conditions; only temperature, humidity and wind speed are validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurrentConditions {
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub wind_speed: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub weather_code: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub condition: String,
    #[serde(deserialize_with = "null_as_default")]
    pub precipitation: f64,
}

/// Hourly forecast as index-aligned sequences (`time[i]` pairs with `temperature[i]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HourlyForecast {
    #[serde(deserialize_with = "null_items_as_default")]
    pub time: Vec<String>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub temperature: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub humidity: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub wind_speed: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub weather_code: Vec<i64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub precipitation_probability: Vec<i64>,
}

/// Multi-day rollup, forwarded untouched when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DailyForecast {
    #[serde(deserialize_with = "null_items_as_default")]
    pub time: Vec<String>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub weather_code: Vec<i64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub temperature_max: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub temperature_min: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub precipitation_sum: Vec<f64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub precipitation_probability_max: Vec<i64>,
    #[serde(deserialize_with = "null_items_as_default")]
    pub wind_speed_max: Vec<f64>,
}

/// Deserialize a field, mapping `null` to the type's zero value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize a sequence where the sequence itself or any entry may be `null`
///
/// Null entries become zero values in place, so index alignment with the
/// other forecast sequences is kept.
fn null_items_as_default<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let items = Option::<Vec<Option<T>>>::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

impl WeatherReading {
    /// Decode a raw queue payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload).map_err(DecodeError::from)
    }

    /// Serialize to the wire format posted to the sink
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_READING: &str = r#"{
        "timestamp": "2025-11-20T14:00:00.123456",
        "location": {"latitude": -23.5505, "longitude": -46.6333},
        "current": {
            "temperature": 24.3,
            "humidity": 71,
            "windSpeed": 9.4,
            "weatherCode": 3,
            "condition": "Overcast",
            "precipitation": 0.2
        },
        "forecast": {
            "time": ["2025-11-20T14:00", "2025-11-20T15:00"],
            "temperature": [24.3, 23.9],
            "humidity": [71, 74],
            "windSpeed": [9.4, 8.1],
            "weatherCode": [3, 61],
            "precipitationProbability": [10, 55]
        },
        "dailyForecast": {
            "time": ["2025-11-20"],
            "weatherCode": [61],
            "temperatureMax": [27.0],
            "temperatureMin": [18.5],
            "precipitationSum": [4.2],
            "precipitationProbabilityMax": [80],
            "windSpeedMax": [14.0]
        }
    }"#;

    #[test]
    fn test_decode_full_reading() {
        let reading = WeatherReading::decode(FULL_READING.as_bytes()).unwrap();

        assert_eq!(reading.timestamp, "2025-11-20T14:00:00.123456");
        assert_eq!(reading.location.latitude, -23.5505);
        assert_eq!(reading.current.humidity, 71.0);
        assert_eq!(reading.current.wind_speed, 9.4);
        assert_eq!(reading.current.weather_code, 3);
        assert_eq!(reading.current.condition, "Overcast");
        assert_eq!(reading.forecast.time.len(), 2);
        assert_eq!(reading.forecast.precipitation_probability, vec![10, 55]);

        let daily = reading.daily_forecast.expect("daily forecast present");
        assert_eq!(daily.temperature_max, vec![27.0]);
        assert_eq!(daily.precipitation_probability_max, vec![80]);
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let reading =
            WeatherReading::decode(br#"{"timestamp":"","current":{"temperature":20}}"#).unwrap();

        assert_eq!(reading.timestamp, "");
        assert_eq!(reading.current.temperature, 20.0);
        assert_eq!(reading.current.humidity, 0.0);
        assert!(reading.forecast.time.is_empty());
        assert!(reading.daily_forecast.is_none());
    }

    #[test]
    fn test_decode_rejects_type_mismatch() {
        let err = WeatherReading::decode(br#"{"timestamp":"t","current":{"temperature":"hot"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("invalid type"));

        assert!(WeatherReading::decode(br#"{"timestamp":42}"#).is_err());
        assert!(WeatherReading::decode(br#"{"forecast":{"weatherCode":[1.5]}}"#).is_err());
    }

    #[test]
    fn test_decode_null_scalars_take_zero_values() {
        let reading = WeatherReading::decode(
            br#"{"timestamp":"t","current":{"temperature":20,"humidity":null,"windSpeed":1,"weatherCode":null,"condition":null}}"#,
        )
        .unwrap();

        assert_eq!(reading.current.temperature, 20.0);
        assert_eq!(reading.current.humidity, 0.0);
        assert_eq!(reading.current.weather_code, 0);
        assert_eq!(reading.current.condition, "");
    }

    #[test]
    fn test_decode_null_sequence_entries_keep_alignment() {
        let reading = WeatherReading::decode(
            br#"{"timestamp":"t","forecast":{"time":["a","b","c"],"temperature":[null,21.5,null],"precipitationProbability":[10,null,30],"windSpeed":null}}"#,
        )
        .unwrap();

        assert_eq!(reading.forecast.temperature, vec![0.0, 21.5, 0.0]);
        assert_eq!(reading.forecast.precipitation_probability, vec![10, 0, 30]);
        assert!(reading.forecast.wind_speed.is_empty());
    }

    #[test]
    fn test_decode_null_sections_and_timestamp() {
        let reading =
            WeatherReading::decode(br#"{"timestamp":null,"location":null,"current":null}"#).unwrap();
        assert_eq!(reading, WeatherReading::default());

        // Still a type mismatch, not a null
        assert!(WeatherReading::decode(br#"{"forecast":{"temperature":[1.0,"hot"]}}"#).is_err());
        assert!(WeatherReading::decode(b"null").is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        for payload in [
            &b""[..],
            b"not json",
            b"{\"timestamp\":\"t\"",
            b"[1, 2, 3]",
            b"\xff\xfe\x00",
        ] {
            assert!(
                WeatherReading::decode(payload).is_err(),
                "payload {:?} should not decode",
                payload
            );
        }
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let reading =
            WeatherReading::decode(br#"{"timestamp":"t","source":"open-meteo","current":{"uv":3}}"#)
                .unwrap();
        assert_eq!(reading.timestamp, "t");
    }

    #[test]
    fn test_wire_format_uses_camel_case_names() {
        let reading = WeatherReading::decode(FULL_READING.as_bytes()).unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&reading.to_wire().unwrap()).unwrap();

        assert_eq!(wire["current"]["windSpeed"], 9.4);
        assert_eq!(wire["current"]["weatherCode"], 3);
        assert_eq!(wire["forecast"]["precipitationProbability"][1], 55);
        assert_eq!(wire["dailyForecast"]["windSpeedMax"][0], 14.0);
        assert!(wire["current"].get("wind_speed").is_none());
    }

    #[test]
    fn test_wire_format_omits_absent_daily_forecast() {
        let reading = WeatherReading {
            timestamp: "2025-11-20T14:00:00".to_string(),
            ..Default::default()
        };
        let wire: serde_json::Value = serde_json::from_slice(&reading.to_wire().unwrap()).unwrap();

        assert!(wire.get("dailyForecast").is_none());
        assert!(wire.get("forecast").is_some());
    }
}
