//! Integration tests for the download session.
//!
//! Every terminal outcome must leave the session inactive, and a second start
//! while one is running must be rejected without touching the network.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use mapfetch_core::catalog::{CatalogResponse, Release, ResultEntry};
use mapfetch_core::config::{DownloadConfig, MapfetchConfig};
use mapfetch_core::download::{DownloadError, DownloadPhase, DownloadSession};
use mapfetch_core::extract::{LocalExtractor, ZipExtractor};
use mapfetch_core::testing::{MockCatalogClient, zip_archive};

const ARCHIVE_URL: &str = "https://cdn.test/rings-v2.zip";

/// Extractor that succeeds without producing anything useful.
#[derive(Debug)]
struct EmptyExtractor;

impl LocalExtractor for EmptyExtractor {
    fn extract(&self, _archive: &Path, dest_dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dest_dir)?;
        std::fs::write(dest_dir.join("README.txt"), b"no map in here")
    }
}

/// Extractor that blocks longer than the configured bound.
#[derive(Debug)]
struct StuckExtractor(Duration);

impl LocalExtractor for StuckExtractor {
    fn extract(&self, _archive: &Path, _dest_dir: &Path) -> io::Result<()> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

/// The first call stalls until a second call arrives, then writes into its
/// own folder while the second call is extracting.
#[derive(Debug)]
struct OverlappingExtractor {
    calls: AtomicUsize,
    rendezvous: Barrier,
}

impl OverlappingExtractor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            rendezvous: Barrier::new(2),
        }
    }
}

impl LocalExtractor for OverlappingExtractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> io::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.rendezvous.wait();
            std::fs::create_dir_all(dest_dir.join("Leftover"))?;
            std::fs::write(dest_dir.join("Leftover/stale.udk"), b"stale")?;
            self.rendezvous.wait();
            Ok(())
        } else {
            self.rendezvous.wait();
            self.rendezvous.wait();
            ZipExtractor.extract(archive, dest_dir)
        }
    }
}

struct SessionFixture {
    client: Arc<MockCatalogClient>,
    session: DownloadSession,
    destination: tempfile::TempDir,
}

impl SessionFixture {
    fn new(extractor: Arc<dyn LocalExtractor>) -> Self {
        Self::with_config(extractor, |_| {})
    }

    fn with_config(extractor: Arc<dyn LocalExtractor>, adjust: impl FnOnce(&mut DownloadConfig)) -> Self {
        let destination = tempfile::tempdir().unwrap();
        let mut config = MapfetchConfig::for_testing();
        config.download.destination = destination.path().to_path_buf();
        adjust(&mut config.download);

        let client = Arc::new(MockCatalogClient::new());
        let session = DownloadSession::new(client.clone(), extractor, config.download);

        Self {
            client,
            session,
            destination,
        }
    }

    fn serve_map_archive(&self, latency: Duration) {
        let archive = zip_archive(&[
            ("Rings/Rings.udk", b"map-bytes".as_slice()),
            ("Rings/preview.jpg", b"jpg".as_slice()),
        ])
        .unwrap();
        self.client
            .respond_after(ARCHIVE_URL, latency, CatalogResponse::new(200, archive));
    }

    fn staging_is_empty(&self) -> bool {
        let staging = self.destination.path().join(".staging");
        std::fs::read_dir(staging).map_or(true, |mut entries| entries.next().is_none())
    }

    fn assert_released(&self, phase: DownloadPhase) {
        let snapshot = self.session.progress_snapshot();
        assert!(!snapshot.active);
        assert!(!self.session.is_active());
        assert_eq!(snapshot.phase, phase);
    }
}

fn item() -> ResultEntry {
    ResultEntry {
        id: 42,
        name: "Speed Jump: Rings".to_string(),
        author: Some("Lethamyr".to_string()),
        size: 2048,
        description: "Fly through rings".to_string(),
        preview_url: Some("https://cdn.test/42/preview.png".to_string()),
        releases: vec![release()],
    }
}

fn release() -> Release {
    Release {
        name: "Version 2".to_string(),
        tag: "v2".to_string(),
        description: String::new(),
        download_url: ARCHIVE_URL.to_string(),
        released_at: None,
    }
}

#[tokio::test]
async fn test_successful_download_installs_artifact() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture.serve_map_archive(Duration::ZERO);

    let installed = fixture.session.start(&item(), &release()).await.unwrap();

    let item_dir = fixture.destination.path().join("Speed Jump_ Rings");
    assert_eq!(installed, item_dir.join("Rings/Rings.udk"));
    assert_eq!(std::fs::read(&installed).unwrap(), b"map-bytes");

    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(item_dir.join("workshop_info.json")).unwrap())
            .unwrap();
    assert_eq!(metadata["id"], 42);
    assert_eq!(metadata["release"], "v2");
    assert_eq!(metadata["download_url"], ARCHIVE_URL);

    assert!(fixture.staging_is_empty());

    fixture.assert_released(DownloadPhase::Done);
    let snapshot = fixture.session.progress_snapshot();
    assert!(snapshot.bytes_total > 0);
    assert_eq!(snapshot.bytes_transferred, snapshot.bytes_total);
    assert_eq!(snapshot.percent(), 100);
}

#[tokio::test]
async fn test_http_404_is_network_failure() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture
        .client
        .respond(ARCHIVE_URL, CatalogResponse::new(404, &b"not found"[..]));

    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(
        result,
        Err(DownloadError::NetworkFailure { status: Some(404), .. })
    ));
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_transport_error_is_network_failure() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture
        .client
        .fail_transport(ARCHIVE_URL, Duration::from_millis(10), "connection reset");

    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(
        result,
        Err(DownloadError::NetworkFailure { status: None, .. })
    ));
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_missing_artifact_is_extraction_timeout() {
    let fixture = SessionFixture::new(Arc::new(EmptyExtractor));
    fixture.serve_map_archive(Duration::ZERO);

    let result = fixture.session.start(&item(), &release()).await;

    match result {
        Err(DownloadError::ExtractionTimeout { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected extraction timeout, got {other:?}"),
    }
    fixture.assert_released(DownloadPhase::Failed);
    assert!(!fixture.destination.path().join("Speed Jump_ Rings").exists());
}

#[tokio::test]
async fn test_stuck_extractor_is_bounded() {
    let fixture = SessionFixture::new(Arc::new(StuckExtractor(Duration::from_secs(3))));
    fixture.serve_map_archive(Duration::ZERO);

    let started = std::time::Instant::now();
    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(
        result,
        Err(DownloadError::ExtractionTimeout { attempts: 0, .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(3));
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_corrupt_archive_is_extraction_failure() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture
        .client
        .respond(ARCHIVE_URL, CatalogResponse::new(200, &b"garbage"[..]));

    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(result, Err(DownloadError::ExtractionFailed { .. })));
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_unwritable_destination_is_io_failure() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture.serve_map_archive(Duration::ZERO);

    // A regular file where the staging folder should go.
    std::fs::write(fixture.destination.path().join(".staging"), b"in the way").unwrap();

    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(result, Err(DownloadError::IoFailure { .. })));
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_release_without_link_is_rejected() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    let mut broken = release();
    broken.download_url = String::new();

    let result = fixture.session.start(&item(), &broken).await;

    assert!(matches!(result, Err(DownloadError::InvalidRelease { .. })));
    assert_eq!(fixture.client.total_requests(), 0);
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture.serve_map_archive(Duration::from_millis(300));

    let session = fixture.session.clone();
    let first = tokio::spawn(async move { session.start(&item(), &release()).await });

    // Wait until the first session has claimed the flag.
    tokio::time::timeout(Duration::from_secs(2), async {
        while !fixture.session.is_active() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let second = fixture.session.start(&item(), &release()).await;
    assert!(matches!(second, Err(DownloadError::AlreadyInProgress)));
    assert_eq!(fixture.client.request_count(ARCHIVE_URL), 1);

    assert!(first.await.unwrap().is_ok());
    fixture.assert_released(DownloadPhase::Done);

    // A finished session does not block the next one.
    fixture.serve_map_archive(Duration::ZERO);
    assert!(fixture.session.start(&item(), &release()).await.is_ok());
}

#[tokio::test]
async fn test_failure_does_not_block_next_download() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    fixture
        .client
        .respond(ARCHIVE_URL, CatalogResponse::new(500, &b""[..]));
    assert!(fixture.session.start(&item(), &release()).await.is_err());

    fixture.serve_map_archive(Duration::ZERO);
    assert!(fixture.session.start(&item(), &release()).await.is_ok());
    fixture.assert_released(DownloadPhase::Done);
}

#[tokio::test]
async fn test_reinstall_replaces_previous_install() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    let item_dir = fixture.destination.path().join("Speed Jump_ Rings");
    std::fs::create_dir_all(item_dir.join("Old")).unwrap();
    std::fs::write(item_dir.join("Old/Rings.udk"), b"old-map").unwrap();
    fixture.serve_map_archive(Duration::ZERO);

    let installed = fixture.session.start(&item(), &release()).await.unwrap();

    assert_eq!(installed, item_dir.join("Rings/Rings.udk"));
    assert!(!item_dir.join("Old").exists());
    assert!(fixture.staging_is_empty());
    fixture.assert_released(DownloadPhase::Done);
}

#[tokio::test]
async fn test_failed_reinstall_keeps_previous_install() {
    let fixture = SessionFixture::new(Arc::new(ZipExtractor));
    let item_dir = fixture.destination.path().join("Speed Jump_ Rings");
    std::fs::create_dir_all(&item_dir).unwrap();
    std::fs::write(item_dir.join("Rings.udk"), b"old-map").unwrap();
    fixture
        .client
        .respond(ARCHIVE_URL, CatalogResponse::new(200, &b"garbage"[..]));

    let result = fixture.session.start(&item(), &release()).await;

    assert!(matches!(result, Err(DownloadError::ExtractionFailed { .. })));
    assert_eq!(std::fs::read(item_dir.join("Rings.udk")).unwrap(), b"old-map");
    fixture.assert_released(DownloadPhase::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_extractor_cannot_touch_next_attempt() {
    let fixture = SessionFixture::with_config(Arc::new(OverlappingExtractor::new()), |config| {
        config.extraction_timeout = Duration::from_millis(200);
    });
    fixture.serve_map_archive(Duration::ZERO);

    let first = fixture.session.start(&item(), &release()).await;
    assert!(matches!(
        first,
        Err(DownloadError::ExtractionTimeout { attempts: 0, .. })
    ));

    let installed = fixture.session.start(&item(), &release()).await.unwrap();

    let item_dir = fixture.destination.path().join("Speed Jump_ Rings");
    assert_eq!(installed, item_dir.join("Rings/Rings.udk"));
    assert!(!item_dir.join("Leftover").exists());
    fixture.assert_released(DownloadPhase::Done);
}
