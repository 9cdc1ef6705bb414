//! Decoding of the newline-delimited JSON measurement stream.
//!
//! Each line of a response body is one of:
//! - empty: a heartbeat, carrying nothing
//! - a measurement: any JSON object with a non-empty `sensorId`
//! - a control record `{"type": ...}`: replay streams only
//!
//! Anything else is a protocol violation.

use serde::Deserialize;

use crate::measurement::WireMeasurement;
use crate::{Measurement, WireError};

/// Which endpoint a stream was opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Open-ended push feed of new measurements.
    Live,
    /// Bounded pull feed between two offsets.
    Replay,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Live => f.write_str("live"),
            StreamKind::Replay => f.write_str("replay"),
        }
    }
}

/// Control records sent on the replay stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRecord {
    /// The replay window has been delivered in full.
    Completed,
    /// The server stopped the replay because of rate limiting.
    RateLimitReached,
    /// A control record this client does not know.
    Other(String),
}

impl ControlRecord {
    fn from_type(kind: String) -> Self {
        match kind.as_str() {
            "completed" => ControlRecord::Completed,
            "rate_limit_reached" => ControlRecord::RateLimitReached,
            _ => ControlRecord::Other(kind),
        }
    }
}

#[derive(Deserialize)]
struct WireControl {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Empty keep-alive line.
    Heartbeat,
    /// A measurement record.
    Measurement(Measurement),
    /// A replay control record.
    Control(ControlRecord),
}

/// Decode one line (without its trailing newline).
///
/// A trailing carriage return is ignored. Control records are only
/// recognized on [`StreamKind::Replay`].
pub fn decode_line(line: &str, kind: StreamKind) -> Result<Frame, WireError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.is_empty() {
        return Ok(Frame::Heartbeat);
    }

    if let Ok(wire) = serde_json::from_str::<WireMeasurement>(line) {
        if wire.has_sensor_id() {
            return wire
                .validate()
                .map(Frame::Measurement)
                .map_err(|reason| WireError::InvalidMeasurement {
                    reason,
                    line: line.to_string(),
                });
        }
    }

    if kind == StreamKind::Replay {
        if let Ok(WireControl { kind: Some(kind) }) = serde_json::from_str::<WireControl>(line) {
            return Ok(Frame::Control(ControlRecord::from_type(kind)));
        }
    }

    Err(WireError::Unrecognized {
        line: line.to_string(),
    })
}
