//! Download session implementation

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::DownloadError;
use super::progress::{DownloadPhase, ProgressSnapshot, SessionState};
use crate::catalog::{CatalogClient, Release, ResultEntry};
use crate::config::DownloadConfig;
use crate::extract::LocalExtractor;

const STAGING_DIR: &str = ".staging";
const METADATA_FILE: &str = "workshop_info.json";

/// Distinguishes staging paths of successive attempts within this process.
static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(0);

/// Drives one download-then-extract pipeline at a time.
///
/// Cloning yields another handle to the same session, which is how a UI keeps
/// polling progress while a worker runs [`DownloadSession::start`].
///
/// The single-flight flag lives in the session, so every caller that must be
/// serialized has to hold a clone of one session. Sessions created separately
/// with [`DownloadSession::new`] do not see each other.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    client: Arc<dyn CatalogClient>,
    extractor: Arc<dyn LocalExtractor>,
    config: DownloadConfig,
    state: Arc<SessionState>,
}

/// Releases the single-flight flag on every exit, including a dropped future.
struct ActiveGuard<'a> {
    state: &'a SessionState,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if !self.state.phase().is_terminal() {
            self.state.set_phase(DownloadPhase::Failed);
        }
        self.state.active.store(false, Ordering::Release);
    }
}

/// Files created under the staging folder for one download attempt.
///
/// Every attempt gets fresh paths, so an extractor thread left running by a
/// timed-out attempt can never write into a later attempt's folder.
#[derive(Debug)]
struct StagingPaths {
    archive: PathBuf,
    extract_dir: PathBuf,
    /// Where an existing install is parked while the new one is moved in.
    previous: PathBuf,
}

/// Contents of the `workshop_info.json` written beside a downloaded map.
#[derive(Debug, Serialize)]
struct MapMetadata<'a> {
    id: u64,
    name: &'a str,
    author: Option<&'a str>,
    description: &'a str,
    preview_url: Option<&'a str>,
    download_url: &'a str,
    release: &'a str,
}

impl DownloadSession {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        extractor: Arc<dyn LocalExtractor>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            client,
            extractor,
            config,
            state: Arc::new(SessionState::default()),
        }
    }

    /// Lock-free progress read, safe to call from a render loop.
    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        self.state.snapshot()
    }

    /// Checks whether a session is currently running.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    /// Downloads `release` of `item`, extracts it and installs the artifact.
    ///
    /// Returns the installed artifact path. The active flag is claimed before
    /// any I/O and is released on every return path.
    ///
    /// # Errors
    /// - `DownloadError::AlreadyInProgress` - Another session is running
    /// - `DownloadError::InvalidRelease` - Release has no download link
    /// - `DownloadError::NetworkFailure` - Transport error or non-2xx status
    /// - `DownloadError::IoFailure` - Archive or artifact could not be written
    /// - `DownloadError::ExtractionFailed` - Extractor rejected the archive
    /// - `DownloadError::ExtractionTimeout` - Artifact did not appear in time
    pub async fn start(&self, item: &ResultEntry, release: &Release) -> Result<PathBuf, DownloadError> {
        if self
            .state
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Download of '{}' rejected: another download is active", item.name);
            return Err(DownloadError::AlreadyInProgress);
        }

        let _guard = ActiveGuard { state: &self.state };
        self.state.reset_for_start();
        info!("Starting download of '{}' release {}", item.name, release.tag);

        let staging = self.staging_paths(item, release);
        let result = self.run(item, release, &staging).await;

        match &result {
            Ok(path) => {
                self.state.set_phase(DownloadPhase::Done);
                info!("Installed '{}' at {}", item.name, path.display());
            }
            Err(e) => {
                self.state.set_phase(DownloadPhase::Failed);
                error!("Download of '{}' failed: {e}", item.name);
                Self::discard_staging(&staging).await;
            }
        }

        result
    }

    async fn run(
        &self,
        item: &ResultEntry,
        release: &Release,
        staging: &StagingPaths,
    ) -> Result<PathBuf, DownloadError> {
        if release.download_url.trim().is_empty() {
            return Err(DownloadError::InvalidRelease {
                reason: format!("release {} has no download link", release.tag),
            });
        }

        self.fetch_archive(release, &staging.archive).await?;

        self.state.set_phase(DownloadPhase::Extracting);
        self.extract_archive(staging).await?;
        let artifact = self.wait_for_artifact(staging).await?;

        let item_dir = self.config.destination.join(item.folder_name());
        let installed = Self::install(staging, &artifact, &item_dir).await?;

        if self.config.write_metadata {
            Self::write_metadata(&item_dir, item, release).await;
        }
        if let Err(e) = tokio::fs::remove_file(&staging.archive).await {
            debug!("Could not remove archive {}: {e}", staging.archive.display());
        }

        Ok(installed)
    }

    async fn fetch_archive(&self, release: &Release, archive: &Path) -> Result<(), DownloadError> {
        let url = release.download_url.as_str();
        let state = Arc::clone(&self.state);
        let on_progress =
            move |total: u64, transferred: u64| state.record_progress(total, transferred);

        let response = self
            .client
            .send_with_progress(url, &on_progress)
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

        // Some servers omit Content-Length; report the final size once known.
        let received = response.body.len() as u64;
        self.state.record_progress(received, received);

        let io_failure = |e: std::io::Error| DownloadError::IoFailure {
            path: archive.to_path_buf(),
            reason: e.to_string(),
        };
        if let Some(parent) = archive.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_failure)?;
        }
        tokio::fs::write(archive, &response.body).await.map_err(io_failure)?;

        debug!("Wrote {received} bytes to {}", archive.display());
        Ok(())
    }

    async fn extract_archive(&self, staging: &StagingPaths) -> Result<(), DownloadError> {
        let extractor = Arc::clone(&self.extractor);
        let archive = staging.archive.clone();
        let extract_dir = staging.extract_dir.clone();
        let task = tokio::task::spawn_blocking(move || extractor.extract(&archive, &extract_dir));

        // On timeout the blocking task keeps running detached inside this attempt's folder.
        match timeout(self.config.extraction_timeout, task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DownloadError::ExtractionFailed {
                archive: staging.archive.clone(),
                reason: e.to_string(),
            }),
            Ok(Err(join_error)) => Err(DownloadError::ExtractionFailed {
                archive: staging.archive.clone(),
                reason: format!("extractor task failed: {join_error}"),
            }),
            Err(_) => Err(DownloadError::ExtractionTimeout {
                archive: staging.archive.clone(),
                attempts: 0,
            }),
        }
    }

    /// Bounded artifact poll with linear backoff.
    async fn wait_for_artifact(&self, staging: &StagingPaths) -> Result<PathBuf, DownloadError> {
        let attempts = self.config.extraction_attempts;

        for attempt in 1..=attempts {
            if let Some(artifact) =
                find_artifact(&staging.extract_dir, &self.config.artifact_extensions).await
            {
                debug!("Found artifact {} on check {attempt}", artifact.display());
                return Ok(artifact);
            }
            if attempt < attempts {
                sleep(self.config.extraction_backoff * attempt).await;
            }
        }

        warn!(
            "No artifact with extensions {:?} in {} after {attempts} checks",
            self.config.artifact_extensions,
            staging.extract_dir.display()
        );
        Err(DownloadError::ExtractionTimeout {
            archive: staging.archive.clone(),
            attempts,
        })
    }

    async fn install(
        staging: &StagingPaths,
        artifact: &Path,
        item_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let io_failure = |path: &Path, e: io::Error| DownloadError::IoFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = item_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure(parent, e))?;
        }
        replace_dir(&staging.extract_dir, item_dir, &staging.previous)
            .await
            .map_err(|e| io_failure(item_dir, e))?;

        let relative = artifact
            .strip_prefix(&staging.extract_dir)
            .map_err(|e| DownloadError::IoFailure {
                path: artifact.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(item_dir.join(relative))
    }

    async fn write_metadata(item_dir: &Path, item: &ResultEntry, release: &Release) {
        let metadata = MapMetadata {
            id: item.id,
            name: &item.name,
            author: item.author.as_deref(),
            description: &item.description,
            preview_url: item.preview_url.as_deref(),
            download_url: &release.download_url,
            release: &release.tag,
        };
        let path = item_dir.join(METADATA_FILE);

        let written = match serde_json::to_vec_pretty(&metadata) {
            Ok(json) => tokio::fs::write(&path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(()) => debug!("Created metadata at {}", path.display()),
            Err(reason) => warn!("Failed to create metadata at {}: {reason}", path.display()),
        }
    }

    fn staging_paths(&self, item: &ResultEntry, release: &Release) -> StagingPaths {
        let staging = self.config.destination.join(STAGING_DIR);
        let attempt = NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed);
        let stem = format!(
            "{}-{}-{}-{attempt}",
            item.id,
            sanitize_component(&release.tag),
            std::process::id()
        );
        StagingPaths {
            archive: staging.join(format!("{stem}.zip")),
            previous: staging.join(format!("{stem}-previous")),
            extract_dir: staging.join(stem),
        }
    }

    async fn discard_staging(staging: &StagingPaths) {
        let _ = tokio::fs::remove_file(&staging.archive).await;
        let _ = tokio::fs::remove_dir_all(&staging.extract_dir).await;
    }
}

/// Moves `source` to `target`.
///
/// An existing `target` is parked at `backup` first and only deleted once the
/// move succeeded; if the move fails it is put back.
async fn replace_dir(source: &Path, target: &Path, backup: &Path) -> io::Result<()> {
    let parked = match tokio::fs::rename(target, backup).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };

    if let Err(e) = tokio::fs::rename(source, target).await {
        if parked && let Err(restore) = tokio::fs::rename(backup, target).await {
            error!(
                "Could not restore previous install from {}: {restore}",
                backup.display()
            );
        }
        return Err(e);
    }

    if parked {
        info!("Replaced existing install at {}", target.display());
        if let Err(e) = tokio::fs::remove_dir_all(backup).await {
            warn!("Could not remove previous install at {}: {e}", backup.display());
        }
    }
    Ok(())
}

fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Depth-first search for the first file carrying one of `extensions`.
async fn find_artifact(root: &Path, extensions: &[String]) -> Option<PathBuf> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && has_extension(&path, extensions) {
                return Some(path);
            }
        }
    }

    None
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["udk".to_string(), "upk".to_string()]
    }

    #[tokio::test]
    async fn test_find_artifact_descends_into_folders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Rings/Maps")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("Rings/Maps/Rings.UDK"), b"x").unwrap();

        let found = find_artifact(dir.path(), &extensions()).await.unwrap();
        assert!(found.ends_with("Rings/Maps/Rings.UDK"));
    }

    #[tokio::test]
    async fn test_find_artifact_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_artifact(&dir.path().join("nope"), &extensions()).await.is_none());
    }

    #[tokio::test]
    async fn test_replace_dir_swaps_in_new_install() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("fresh");
        let target = dir.path().join("Rings");
        let backup = dir.path().join("parked");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("Rings.udk"), b"new").unwrap();
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("Rings.udk"), b"old").unwrap();

        replace_dir(&source, &target, &backup).await.unwrap();

        assert_eq!(std::fs::read(target.join("Rings.udk")).unwrap(), b"new");
        assert!(!source.exists());
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn test_replace_dir_keeps_previous_install_when_move_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Rings");
        let backup = dir.path().join("parked");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("Rings.udk"), b"old").unwrap();

        let result = replace_dir(&dir.path().join("vanished"), &target, &backup).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(target.join("Rings.udk")).unwrap(), b"old");
        assert!(!backup.exists());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("v1.2/beta 3"), "v1.2_beta_3");
    }
}
