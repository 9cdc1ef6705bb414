//! # sync-client
//!
//! Streaming client for the measurement API.
//!
//! ## Features
//!
//! - **Live and replay endpoints**: newline-delimited JSON over HTTP, gzip encoded
//! - **Error taxonomy**: every failure is retriable, fatal, or an invalid request
//! - **Source abstraction**: pluggable [`MeasurementSource`] (HTTP, mock)
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use sync_client::{HttpSource, HttpSourceConfig, MeasurementSource};
//!
//! let source = HttpSource::new(HttpSourceConfig {
//!     organization_id: "my-org".into(),
//!     api_key: "my-key".into(),
//!     ..Default::default()
//! })?;
//!
//! let mut live = source.live().await?;
//! while let Some(measurement) = live.next().await {
//!     println!("{:?}", measurement?);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod source;

pub use error::{classify_status, ApiError, BoxError, FatalKind, RetriableKind};
pub use source::{
    decode_body, HttpSource, HttpSourceConfig, MeasurementSource, MeasurementStream, MockSource,
    DEFAULT_API_URL,
};
