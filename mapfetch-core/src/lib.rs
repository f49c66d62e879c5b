//! Mapfetch Core - Catalog access and content delivery
//!
//! This crate provides the building blocks for fetching workshop maps from a
//! remote catalog: the catalog client seam, the single-flight download session
//! with lock-free progress reporting, archive extraction, and configuration.

pub mod catalog;
pub mod config;
pub mod download;
pub mod extract;
pub mod preview;
pub mod tracing_setup;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types for convenient access
pub use catalog::{CatalogClient, CatalogError, CatalogResponse, HttpCatalogClient, Release, ResultEntry};
pub use config::MapfetchConfig;
pub use download::{DownloadError, DownloadPhase, DownloadSession, ProgressSnapshot};
pub use extract::{LocalExtractor, ZipExtractor};
pub use preview::PreviewCache;

/// Top-level errors that can bubble up from any Mapfetch subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MapfetchError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapfetchError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            MapfetchError::Catalog(CatalogError::Transport { url, .. }) => {
                format!("Could not reach the map catalog at {url}")
            }
            MapfetchError::Catalog(CatalogError::Parse { .. }) => {
                "The map catalog returned an unexpected response".to_string()
            }
            MapfetchError::Download(DownloadError::AlreadyInProgress) => {
                "Another download is already running".to_string()
            }
            MapfetchError::Download(e) => format!("Download failed: {e}"),
            MapfetchError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            MapfetchError::Io(_) => "File system error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapfetchError>;
