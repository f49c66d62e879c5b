//! On-disk cache for catalog preview images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::catalog::{CatalogClient, ResultEntry};
use crate::download::DownloadError;

/// Folder under the download destination that holds cached previews.
pub const PREVIEW_DIR: &str = "previews";

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Downloads each item's preview image once and serves it from disk after.
#[derive(Debug, Clone)]
pub struct PreviewCache {
    client: Arc<dyn CatalogClient>,
    dir: PathBuf,
}

impl PreviewCache {
    pub fn new(client: Arc<dyn CatalogClient>, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    /// Cache folder, usually `{destination}/previews`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the cached preview for `entry`, downloading it if needed.
    ///
    /// Entries without a preview URL yield `Ok(None)`.
    ///
    /// # Errors
    /// - `DownloadError::NetworkFailure` - Image request failed
    /// - `DownloadError::IoFailure` - Cache folder or file not writable
    pub async fn fetch(&self, entry: &ResultEntry) -> Result<Option<PathBuf>, DownloadError> {
        let Some(url) = entry.preview_url.as_deref() else {
            return Ok(None);
        };
        let path = self.dir.join(format!("{}.{}", entry.id, image_extension(url)));

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Preview for '{}' served from cache", entry.name);
            return Ok(Some(path));
        }

        let response = self
            .client
            .send(url)
            .await
            .map_err(|e| DownloadError::NetworkFailure {
                url: url.to_string(),
                status: None,
                reason: e.to_string(),
            })?;
        if !response.is_success() {
            return Err(DownloadError::NetworkFailure {
                url: url.to_string(),
                status: Some(response.status),
                reason: format!("HTTP {}", response.status),
            });
        }

        let io_failure = |e: std::io::Error| DownloadError::IoFailure {
            path: path.clone(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_failure)?;
        tokio::fs::write(&path, &response.body).await.map_err(io_failure)?;

        debug!("Cached preview for '{}' at {}", entry.name, path.display());
        Ok(Some(path))
    }
}

fn image_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    ext.and_then(|ext| IMAGE_EXTENSIONS.iter().copied().find(|known| *known == ext))
        .unwrap_or("jpg")
}
