//! reqwest-backed catalog client.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tracing::{debug, trace};

use super::{CatalogClient, CatalogError, CatalogResponse, ProgressFn};
use crate::config::CatalogConfig;

// Cap on the up-front body allocation; servers can lie about Content-Length.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// HTTP catalog client.
///
/// Timeouts are enforced by the underlying reqwest client, so every call
/// eventually resolves.
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
}

impl HttpCatalogClient {
    /// Creates a client using the catalog timeouts and user agent.
    ///
    /// # Errors
    /// - `CatalogError::Transport` - TLS backend or client construction failed
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CatalogError::Transport {
                url: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }

    fn transport_error(url: &str, error: reqwest::Error) -> CatalogError {
        CatalogError::Transport {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn send(&self, url: &str) -> Result<CatalogResponse, CatalogError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        trace!("GET {url} -> {status} ({} bytes)", body.len());
        Ok(CatalogResponse::new(status, body))
    }

    async fn send_with_progress(
        &self,
        url: &str,
        on_progress: &ProgressFn,
    ) -> Result<CatalogResponse, CatalogError> {
        debug!("GET {url} (streaming)");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Ok(CatalogResponse::new(status.as_u16(), body));
        }

        let total = response.content_length().unwrap_or(0);
        on_progress(total, 0);

        let mut body = BytesMut::with_capacity(total.min(MAX_PREALLOCATION) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::transport_error(url, e))?;
            body.extend_from_slice(&chunk);
            on_progress(total, body.len() as u64);
        }

        debug!("GET {url} -> {} ({} bytes)", status.as_u16(), body.len());
        Ok(CatalogResponse::new(status.as_u16(), body.freeze()))
    }
}
