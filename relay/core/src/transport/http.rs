//! Reqwest Transport
//!
//! Default [`HttpTransport`] over a shared `reqwest::Client`. The body is
//! exposed through `bytes_stream()`, so nothing is buffered here beyond
//! what `reqwest` itself holds for the current chunk.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use crate::config::BackendConfig;

/// Timeout for [`HttpTransport::probe`]
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP transport backed by `reqwest`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with explicit timeouts
    ///
    /// `request_timeout` bounds the whole exchange including the streamed
    /// body; `None` leaves streams unbounded.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Client` if the TLS backend cannot be
    /// initialised.
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Build a transport from the `[backend]` configuration section
    ///
    /// # Errors
    ///
    /// See [`ReqwestTransport::new`].
    pub fn from_config(config: &BackendConfig) -> Result<Self, TransportError> {
        Self::new(config.connect_timeout(), config.request_timeout())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_stream(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .http_client
            .post(&request.url)
            .header(reqwest::header::ACCEPT, "text/event-stream, application/json")
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        tracing::debug!(
            url = %request.url,
            status,
            content_type = content_type.as_deref().unwrap_or("-"),
            "Response headers received"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())))
            .boxed();

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }

    async fn probe(&self, url: &str) -> bool {
        self.http_client
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok()
    }
}
