//! Error taxonomy for the streaming API.
//!
//! Every failure of a live or replay call is one [`ApiError`]:
//! - [`ApiError::Retriable`]: transient, drives backoff
//! - [`ApiError::Fatal`]: stop syncing
//! - [`ApiError::InvalidRequest`]: the server rejected a replay window for good

use std::fmt;
use thiserror::Error;

/// Boxed cause attached to retriable errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transient failures that may not recur if the call is repeated later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetriableKind {
    /// Transport or I/O failure, including a stream that closed unexpectedly.
    ConnectionProblem,
    /// HTTP 429 or a `rate_limit_reached` control record.
    RateLimited,
    /// HTTP 500.
    ServerError,
    /// HTTP 503.
    Unavailable,
}

impl fmt::Display for RetriableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetriableKind::ConnectionProblem => f.write_str("connection problem"),
            RetriableKind::RateLimited => f.write_str("rate limited"),
            RetriableKind::ServerError => f.write_str("server error"),
            RetriableKind::Unavailable => f.write_str("service unavailable"),
        }
    }
}

/// Unrecoverable failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalKind {
    /// HTTP 401: the API key was rejected.
    InvalidCredentials,
    /// HTTP 403: the key has no access to the organization.
    NoAccess,
    /// A body line that is not part of the protocol.
    UnexpectedData {
        /// The offending line.
        line: String,
    },
    /// Any HTTP status outside the documented contract.
    UnexpectedStatus {
        /// The status code received.
        status: u16,
    },
    /// The HTTP client could not be set up from its configuration.
    ClientSetup {
        /// Why setup failed.
        reason: String,
    },
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalKind::InvalidCredentials => f.write_str("invalid credentials"),
            FatalKind::NoAccess => f.write_str("no access"),
            FatalKind::UnexpectedData { line } => write!(f, "unexpected data: {line}"),
            FatalKind::UnexpectedStatus { status } => write!(f, "unexpected status code {status}"),
            FatalKind::ClientSetup { reason } => write!(f, "client setup failed: {reason}"),
        }
    }
}

/// A failed call to the live or replay endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transient failure; retry after backing off.
    #[error("retriable API error: {kind}")]
    Retriable {
        /// What went wrong.
        kind: RetriableKind,
        /// Underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Unrecoverable failure.
    #[error("fatal API error: {kind}")]
    Fatal {
        /// What went wrong.
        kind: FatalKind,
    },

    /// HTTP 400: the replay window is not valid and never will be.
    #[error("invalid request")]
    InvalidRequest,
}

impl ApiError {
    /// A retriable error without a cause.
    pub fn retriable(kind: RetriableKind) -> Self {
        ApiError::Retriable { kind, source: None }
    }

    /// A transport or I/O failure.
    pub fn connection(source: impl Into<BoxError>) -> Self {
        ApiError::Retriable {
            kind: RetriableKind::ConnectionProblem,
            source: Some(source.into()),
        }
    }

    /// The server closed the body before the stream was done.
    pub fn connection_closed() -> Self {
        Self::retriable(RetriableKind::ConnectionProblem)
    }

    /// A fatal error.
    pub fn fatal(kind: FatalKind) -> Self {
        ApiError::Fatal { kind }
    }

    /// A line that is not part of the protocol.
    pub fn unexpected_data(line: impl Into<String>) -> Self {
        Self::fatal(FatalKind::UnexpectedData { line: line.into() })
    }

    /// The client cannot be built; retrying will not help.
    pub fn client_setup(reason: impl fmt::Display) -> Self {
        Self::fatal(FatalKind::ClientSetup {
            reason: reason.to_string(),
        })
    }

    /// Whether retrying later may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiError::Retriable { .. })
    }

    /// Whether the server rejected the request outright (HTTP 400).
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, ApiError::InvalidRequest)
    }

    /// The retriable kind, if this error is retriable.
    pub fn retriable_kind(&self) -> Option<RetriableKind> {
        match self {
            ApiError::Retriable { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Map an HTTP status to the error it stands for. `200` is `Ok`.
pub fn classify_status(status: u16) -> Result<(), ApiError> {
    match status {
        200 => Ok(()),
        400 => Err(ApiError::InvalidRequest),
        401 => Err(ApiError::fatal(FatalKind::InvalidCredentials)),
        403 => Err(ApiError::fatal(FatalKind::NoAccess)),
        429 => Err(ApiError::retriable(RetriableKind::RateLimited)),
        500 => Err(ApiError::retriable(RetriableKind::ServerError)),
        503 => Err(ApiError::retriable(RetriableKind::Unavailable)),
        // Includes 406, which only happens if gzip was not accepted.
        status => Err(ApiError::fatal(FatalKind::UnexpectedStatus { status })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert!(classify_status(200).is_ok());
        assert!(classify_status(400).unwrap_err().is_invalid_request());

        assert!(matches!(
            classify_status(401),
            Err(ApiError::Fatal {
                kind: FatalKind::InvalidCredentials
            })
        ));
        assert!(matches!(
            classify_status(403),
            Err(ApiError::Fatal {
                kind: FatalKind::NoAccess
            })
        ));

        assert_eq!(
            classify_status(429).unwrap_err().retriable_kind(),
            Some(RetriableKind::RateLimited)
        );
        assert_eq!(
            classify_status(500).unwrap_err().retriable_kind(),
            Some(RetriableKind::ServerError)
        );
        assert_eq!(
            classify_status(503).unwrap_err().retriable_kind(),
            Some(RetriableKind::Unavailable)
        );
    }

    #[test]
    fn other_statuses_are_fatal() {
        for status in [201, 204, 301, 302, 404, 406, 502, 504] {
            let err = classify_status(status).unwrap_err();
            assert!(!err.is_retriable(), "status {status} must not be retriable");
            assert!(matches!(
                err,
                ApiError::Fatal {
                    kind: FatalKind::UnexpectedStatus { status: s }
                } if s == status
            ));
        }
    }

    #[test]
    fn connection_errors_keep_their_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = ApiError::connection(io);

        assert!(err.is_retriable());
        let source = std::error::Error::source(&err).expect("cause is kept");
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn client_setup_errors_are_fatal() {
        let err = ApiError::client_setup("bad TLS backend");

        assert!(!err.is_retriable());
        assert!(!err.is_invalid_request());
        assert_eq!(
            err.to_string(),
            "fatal API error: client setup failed: bad TLS backend"
        );
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ApiError::retriable(RetriableKind::RateLimited).to_string(),
            "retriable API error: rate limited"
        );
        assert_eq!(
            ApiError::fatal(FatalKind::UnexpectedStatus { status: 418 }).to_string(),
            "fatal API error: unexpected status code 418"
        );
        assert_eq!(ApiError::InvalidRequest.to_string(), "invalid request");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApiError>();
    }
}
