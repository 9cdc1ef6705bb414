//! Error types for wire decoding.

use thiserror::Error;

/// Errors that can occur while decoding a stream line.
#[derive(Debug, Error)]
pub enum WireError {
    /// Line is neither a measurement nor an allowed control record.
    #[error("unrecognized line: {line}")]
    Unrecognized {
        /// The offending line, verbatim.
        line: String,
    },

    /// Line has a sensor ID but is not a well-formed measurement.
    #[error("invalid measurement ({reason}): {line}")]
    InvalidMeasurement {
        /// What is wrong with the measurement.
        reason: &'static str,
        /// The offending line, verbatim.
        line: String,
    },
}

impl WireError {
    /// The raw line that failed to decode.
    pub fn line(&self) -> &str {
        match self {
            WireError::Unrecognized { line } => line,
            WireError::InvalidMeasurement { line, .. } => line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::Unrecognized {
            line: "garbage".into(),
        };
        assert_eq!(err.to_string(), "unrecognized line: garbage");
        assert_eq!(err.line(), "garbage");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
