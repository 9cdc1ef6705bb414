//! HTTP source backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL};
use sync_types::{Offset, StreamKind};
use tokio_util::io::StreamReader;

use super::{decode_body, MeasurementSource, MeasurementStream};
use crate::error::classify_status;
use crate::ApiError;

/// Default base URL of the public API.
pub const DEFAULT_API_URL: &str = "https://api.ecostruxureit.com/rest/v1";

/// Configuration for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Base URL, e.g. `https://api.ecostruxureit.com/rest/v1`.
    pub base_url: String,
    /// Organization whose measurements are synchronized.
    pub organization_id: String,
    /// Bearer token.
    pub api_key: String,
    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            organization_id: String::new(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Streams measurements from the REST endpoints.
///
/// There is no read timeout: the live stream may legitimately stay open for
/// days, and heartbeats keep the connection alive. Redirects are not
/// followed and responses are never cached.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSource {
    /// Build a source from its configuration.
    ///
    /// A malformed base URL or a client that cannot be built is a fatal
    /// [`FatalKind::ClientSetup`](crate::FatalKind::ClientSetup) error.
    pub fn new(config: HttpSourceConfig) -> Result<Self, ApiError> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            ApiError::client_setup(format!("invalid base URL {:?}: {}", config.base_url, e))
        })?;

        // The gzip feature sends `Accept-Encoding: gzip` and inflates bodies.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .build()
            .map_err(ApiError::client_setup)?;

        let base_url = format!(
            "{}/organizations/{}/measurements",
            config.base_url.trim_end_matches('/'),
            config.organization_id
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    async fn open(
        &self,
        kind: StreamKind,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<MeasurementStream, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("Opening {} stream at {}", kind, url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(AUTHORIZATION, format!("bearer {}", self.api_key))
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(ApiError::connection)?;

        classify_status(response.status().as_u16())?;

        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(decode_body(StreamReader::new(body), kind))
    }
}

#[async_trait]
impl MeasurementSource for HttpSource {
    async fn live(&self) -> Result<MeasurementStream, ApiError> {
        self.open(StreamKind::Live, "live", &[]).await
    }

    async fn replay(&self, from: &Offset, to: &Offset) -> Result<MeasurementStream, ApiError> {
        self.open(
            StreamKind::Replay,
            "replay",
            &[("fromOffset", from.as_str()), ("toOffset", to.as_str())],
        )
        .await
    }
}
