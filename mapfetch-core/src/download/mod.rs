//! Single-flight download and extraction of catalog releases
//!
//! A [`DownloadSession`] fetches one release archive at a time, extracts it
//! and moves the playable artifact into the workshop folder. Progress is
//! published through atomics so a renderer can poll
//! [`DownloadSession::progress_snapshot`] at any rate without locking.

use std::path::PathBuf;

use thiserror::Error;

mod progress;
mod session;

pub use progress::{DownloadPhase, ProgressSnapshot};
pub use session::DownloadSession;

/// Terminal failures of a download session.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Another session is active; nothing was requested.
    #[error("A download is already in progress")]
    AlreadyInProgress,

    /// Transport error or non-2xx response.
    #[error("Network failure for {url}: {reason}")]
    NetworkFailure {
        /// Download URL
        url: String,
        /// HTTP status when a response was received
        status: Option<u16>,
        /// Failure description
        reason: String,
    },

    /// The archive or the final artifact could not be written or moved.
    #[error("I/O failure at {}: {reason}", path.display())]
    IoFailure {
        /// Path being written
        path: PathBuf,
        /// Failure description
        reason: String,
    },

    /// The extractor reported an error.
    #[error("Extraction of {} failed: {reason}", archive.display())]
    ExtractionFailed {
        /// Archive being extracted
        archive: PathBuf,
        /// Failure description
        reason: String,
    },

    /// The expected artifact never appeared.
    ///
    /// `attempts` is 0 when the extractor call itself exceeded its bound.
    #[error("Extraction of {} timed out after {attempts} checks", archive.display())]
    ExtractionTimeout {
        /// Archive being extracted
        archive: PathBuf,
        /// Number of artifact checks performed
        attempts: u32,
    },

    /// The selected release cannot be downloaded.
    #[error("Invalid release: {reason}")]
    InvalidRelease {
        /// Why the release was rejected
        reason: String,
    },
}
