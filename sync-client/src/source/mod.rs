//! Measurement sources.
//!
//! A [`MeasurementSource`] opens the live and replay endpoints and hands back
//! a stream of measurements. Status codes, heartbeats and control records are
//! already dealt with by the time an item reaches the consumer:
//!
//! - `Some(Ok(m))`: the next measurement
//! - `Some(Err(e))`: the stream failed; no further items follow
//! - `None`: the replay window was delivered in full (replay only)
//!
//! A live stream never ends with `None`; the server closing the body is a
//! retriable connection problem.

mod http;
mod mock;

pub use http::{HttpSource, HttpSourceConfig, DEFAULT_API_URL};
pub use mock::MockSource;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use sync_types::{decode_line, ControlRecord, Frame, Measurement, Offset, StreamKind};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::ApiError;

/// Stream of decoded measurements.
pub type MeasurementStream = BoxStream<'static, Result<Measurement, ApiError>>;

/// Opens measurement streams.
///
/// This trait allows swapping the HTTP source for a mock in tests.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Open the open-ended live stream.
    async fn live(&self) -> Result<MeasurementStream, ApiError>;

    /// Open a replay of everything between `from` and `to`.
    async fn replay(&self, from: &Offset, to: &Offset) -> Result<MeasurementStream, ApiError>;
}

/// Turn a newline-delimited body into a [`MeasurementStream`].
pub fn decode_body<R>(reader: R, kind: StreamKind) -> MeasurementStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    Box::pin(stream::unfold(Some(reader.lines()), move |state| async move {
        let mut lines = state?;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("{} stream closed by server", kind);
                    return Some((Err(ApiError::connection_closed()), None));
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Some((Err(ApiError::unexpected_data("<invalid UTF-8>")), None));
                }
                Err(e) => return Some((Err(ApiError::connection(e)), None)),
            };

            match decode_line(&line, kind) {
                Ok(Frame::Heartbeat) => continue,
                Ok(Frame::Measurement(m)) => return Some((Ok(m), Some(lines))),
                Ok(Frame::Control(ControlRecord::Completed)) => return None,
                Ok(Frame::Control(ControlRecord::RateLimitReached)) => {
                    tracing::debug!("replay stopped by rate limiting");
                    return Some((
                        Err(ApiError::retriable(crate::RetriableKind::RateLimited)),
                        None,
                    ));
                }
                Ok(Frame::Control(ControlRecord::Other(other))) => {
                    tracing::warn!("Unknown control record type: {}", other);
                    return Some((Err(ApiError::unexpected_data(line)), None));
                }
                Err(e) => return Some((Err(ApiError::unexpected_data(e.line())), None)),
            }
        }
    }))
}
