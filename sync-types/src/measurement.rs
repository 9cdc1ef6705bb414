//! Measurement records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Offset;

/// The value of a measurement: numeric or textual, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    /// A numeric reading (`numericValue` on the wire).
    Numeric(f64),
    /// A textual reading (`stringValue` on the wire).
    Text(String),
}

/// A single sensor reading.
///
/// Identity for storage is `(sensor_id, timestamp)`; a later write with the
/// same identity overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMeasurement", try_from = "WireMeasurement")]
pub struct Measurement {
    /// Sensor that produced the reading (never empty).
    pub sensor_id: String,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// The reading itself.
    pub value: MeasurementValue,
    /// Batch boundary marker from the service, if any.
    pub offset: Option<Offset>,
}

impl Measurement {
    /// Create a measurement without an offset.
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>, value: MeasurementValue) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
            offset: None,
        }
    }

    /// Attach an offset to this measurement.
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The numeric value, if this is a numeric reading.
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            MeasurementValue::Numeric(v) => Some(*v),
            MeasurementValue::Text(_) => None,
        }
    }

    /// The textual value, if this is a textual reading.
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            MeasurementValue::Numeric(_) => None,
            MeasurementValue::Text(v) => Some(v),
        }
    }

    /// Encode as one line of the newline-delimited stream (without the newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Field-for-field image of a measurement line.
///
/// Everything is optional so that any JSON object parses; validation
/// happens in [`WireMeasurement::validate`].
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMeasurement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

impl WireMeasurement {
    /// Whether the line identifies itself as a measurement.
    pub fn has_sensor_id(&self) -> bool {
        self.sensor_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn validate(self) -> Result<Measurement, &'static str> {
        let sensor_id = match self.sensor_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err("missing sensorId"),
        };
        let timestamp = self.timestamp.ok_or("missing timestamp")?;
        let value = match (self.numeric_value, self.string_value) {
            (Some(v), None) => MeasurementValue::Numeric(v),
            (None, Some(v)) => MeasurementValue::Text(v),
            (Some(_), Some(_)) => return Err("both numericValue and stringValue set"),
            (None, None) => return Err("neither numericValue nor stringValue set"),
        };
        Ok(Measurement {
            sensor_id,
            timestamp,
            value,
            offset: self.offset.and_then(Offset::new),
        })
    }
}

impl TryFrom<WireMeasurement> for Measurement {
    type Error = &'static str;

    fn try_from(wire: WireMeasurement) -> Result<Self, Self::Error> {
        wire.validate()
    }
}

impl From<Measurement> for WireMeasurement {
    fn from(m: Measurement) -> Self {
        let (numeric_value, string_value) = match m.value {
            MeasurementValue::Numeric(v) => (Some(v), None),
            MeasurementValue::Text(v) => (None, Some(v)),
        };
        Self {
            sensor_id: Some(m.sensor_id),
            timestamp: Some(m.timestamp),
            numeric_value,
            string_value,
            offset: m.offset.map(|o| o.as_str().to_string()),
        }
    }
}
