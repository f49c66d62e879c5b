//! Archive extraction for downloaded maps.

use std::fs::File;
use std::io;
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

/// Unpacks a downloaded archive into a directory.
///
/// Implementations may block; the download session runs them on the blocking
/// pool and bounds the wait.
pub trait LocalExtractor: Send + Sync + std::fmt::Debug {
    /// Extracts `archive` into `dest_dir`, creating it if needed.
    ///
    /// # Errors
    /// - `io::Error` - Archive unreadable or destination not writable
    fn extract(&self, archive: &Path, dest_dir: &Path) -> io::Result<()>;
}

/// ZIP extractor backed by the `zip` crate.
///
/// Entries whose names would escape `dest_dir` are rejected by the archive
/// reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl LocalExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> io::Result<()> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file).map_err(io::Error::other)?;

        std::fs::create_dir_all(dest_dir)?;
        debug!(
            "Extracting {} entries from {} into {}",
            zip.len(),
            archive.display(),
            dest_dir.display()
        );
        zip.extract(dest_dir).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_zip_extraction_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("map.zip");
        write_zip(&archive, &[("Rings/Rings.udk", b"udk"), ("README.txt", b"hi")]);

        let out = dir.path().join("out");
        ZipExtractor.extract(&archive, &out).unwrap();

        assert_eq!(std::fs::read(out.join("Rings/Rings.udk")).unwrap(), b"udk");
        assert!(out.join("README.txt").exists());
    }

    #[test]
    fn test_corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        assert!(ZipExtractor.extract(&archive, &dir.path().join("out")).is_err());
    }
}
