//! HTTP transport.
//!
//! A [`Transport`] opens one streaming request and hands back the raw response
//! body. The session never talks to the network directly, so tests and embedders
//! can substitute their own implementation.

use crate::request::{RequestBody, request_headers};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::types::SessionOptions;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use std::pin::Pin;
use std::time::Duration;

/// Raw response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens a streaming request.
///
/// Implementations must fail with [`Error::Status`] for a non-2xx response
/// before returning a body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, body: &RequestBody) -> Result<ByteStream>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    retry: Option<RetryConfig>,
}

impl HttpTransport {
    pub fn new(options: &SessionOptions) -> Result<Self> {
        // No overall request timeout: bodies are long-lived streams and silence
        // is bounded by the reader's idle timeout instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout()))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: options.endpoint().to_string(),
            headers: request_headers(options.api_key())?,
            retry: options.retry().cloned(),
        })
    }

    async fn open_once(&self, body: &RequestBody) -> Result<ByteStream> {
        tracing::debug!(
            endpoint = %self.endpoint,
            items = body.input.len(),
            previous_response_id = ?body.previous_response_id,
            "opening response stream"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|e| {
                tracing::debug!(error = %e, "could not read error response body");
                String::new()
            });
            return Err(Error::status(status.as_u16(), text));
        }

        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map_err(Error::Http)),
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, body: &RequestBody) -> Result<ByteStream> {
        match &self.retry {
            Some(config) => retry_with_backoff(config, || self.open_once(body)).await,
            None => self.open_once(body).await,
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .finish()
    }
}
