//! Remote catalog access.
//!
//! The search and download layers only talk to the catalog through
//! [`CatalogClient`], so tests can substitute a scripted client and the
//! production build uses [`HttpCatalogClient`].

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod http;
pub mod types;
pub mod wire;

pub use http::HttpCatalogClient;
pub use types::{Release, ResultEntry};
pub use wire::{CatalogEndpoints, ProjectSummary};

/// Progress callback invoked as `(bytes_total, bytes_transferred)`.
///
/// `bytes_total` is 0 while the size is unknown.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Errors raised while talking to the catalog or decoding its payloads.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request never produced an HTTP response (DNS, connect, timeout, reset).
    #[error("Transport failure for {url}: {reason}")]
    Transport {
        /// Requested URL
        url: String,
        /// Underlying client error
        reason: String,
    },

    /// The response body did not match the expected catalog format.
    #[error("Malformed catalog payload: {reason}")]
    Parse {
        /// Decoder error
        reason: String,
    },
}

/// Completed catalog response: status code and the full payload.
#[derive(Debug, Clone)]
pub struct CatalogResponse {
    pub status: u16,
    pub body: Bytes,
}

impl CatalogResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Checks for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Asynchronous catalog transport.
///
/// Each call resolves exactly once, with either a response (any status) or a
/// transport error. Callers never see a call that silently hangs past the
/// client's own timeout.
#[async_trait]
pub trait CatalogClient: Send + Sync + std::fmt::Debug {
    /// Fetches `url` and returns status plus payload.
    ///
    /// # Errors
    /// - `CatalogError::Transport` - No HTTP response was obtained
    async fn send(&self, url: &str) -> Result<CatalogResponse, CatalogError>;

    /// Fetches `url`, reporting transfer progress on every received chunk.
    ///
    /// # Errors
    /// - `CatalogError::Transport` - No HTTP response was obtained or the body stream broke
    async fn send_with_progress(
        &self,
        url: &str,
        on_progress: &ProgressFn,
    ) -> Result<CatalogResponse, CatalogError>;
}
