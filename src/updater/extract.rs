//! Package extraction.

use crate::error::{Result, UpdateError};
use std::fs::File;
use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// An unpacked update package. The directory is removed on drop.
#[derive(Debug)]
pub struct ExtractedPackage {
    dir: TempDir,
    files: usize,
    skipped: usize,
}

impl ExtractedPackage {
    /// Root of the extracted tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files written.
    pub fn files(&self) -> usize {
        self.files
    }

    /// Number of entries skipped because they could not be read, written
    /// or escaped the extraction root.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Unzip `package` into a fresh temporary directory.
///
/// Entries that fail individually are skipped with a warning.
///
/// # Errors
///
/// Returns [`UpdateError::Extraction`] when the archive cannot be opened
/// or no file could be extracted.
pub fn extract_package(package: &Path) -> Result<ExtractedPackage> {
    let file = File::open(package).map_err(|e| {
        UpdateError::Extraction(format!("cannot open {}: {e}", package.display()))
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| UpdateError::Extraction(format!("not a zip archive: {e}")))?;

    let dir = tempfile::Builder::new().prefix("hub-update-").tempdir()?;
    let root = dir.path();
    info!(package = %package.display(), entries = archive.len(), "extracting package");

    let mut files = 0usize;
    let mut skipped = 0usize;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index, error = %e, "skipping unreadable entry");
                skipped += 1;
                continue;
            }
        };

        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping entry outside extraction root");
            skipped += 1;
            continue;
        };
        let out_path = root.join(&relative);

        if entry.is_dir() {
            if let Err(e) = std::fs::create_dir_all(&out_path) {
                warn!(name = entry.name(), error = %e, "cannot create directory");
                skipped += 1;
            }
            continue;
        }

        let written = (|| -> io::Result<u64> {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            let n = io::copy(&mut entry, &mut out)?;
            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                out.set_permissions(std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
            Ok(n)
        })();

        match written {
            Ok(bytes) => {
                files += 1;
                debug!(name = %relative.display(), bytes, "extracted");
            }
            Err(e) => {
                warn!(name = entry.name(), error = %e, "skipping entry that failed to extract");
                if let Err(rm) = std::fs::remove_file(&out_path)
                    && rm.kind() != io::ErrorKind::NotFound
                {
                    warn!(path = %out_path.display(), error = %rm, "cannot remove partial entry");
                }
                skipped += 1;
            }
        }
    }

    if files == 0 {
        return Err(UpdateError::Extraction(
            "package contains no extractable files".to_owned(),
        ));
    }

    info!(files, skipped, "package extracted");
    Ok(ExtractedPackage {
        dir,
        files,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(
            &pkg,
            &[("app", b"binary"), ("assets/", b""), ("assets/logo.png", b"png")],
        );

        let extracted = extract_package(&pkg).unwrap();
        assert_eq!(extracted.files(), 2);
        assert_eq!(extracted.skipped(), 0);
        assert_eq!(std::fs::read(extracted.path().join("app")).unwrap(), b"binary");
        assert_eq!(
            std::fs::read(extracted.path().join("assets/logo.png")).unwrap(),
            b"png"
        );
    }

    #[test]
    fn escaping_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(&pkg, &[("../evil", b"x"), ("app", b"binary")]);

        let extracted = extract_package(&pkg).unwrap();
        assert_eq!(extracted.files(), 1);
        assert_eq!(extracted.skipped(), 1);
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn only_escaping_entries_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(&pkg, &[("../evil", b"x")]);
        assert!(matches!(
            extract_package(&pkg),
            Err(UpdateError::Extraction(_))
        ));
    }

    #[test]
    fn empty_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(&pkg, &[("docs/", b"")]);
        assert!(matches!(
            extract_package(&pkg),
            Err(UpdateError::Extraction(_))
        ));
    }

    #[test]
    fn non_zip_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        std::fs::write(&pkg, b"definitely not a zip").unwrap();
        assert!(matches!(
            extract_package(&pkg),
            Err(UpdateError::Extraction(_))
        ));
    }

    #[test]
    fn temp_dir_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(&pkg, &[("app", b"binary")]);

        let extracted = extract_package(&pkg).unwrap();
        let root = extracted.path().to_owned();
        assert!(root.exists());
        drop(extracted);
        assert!(!root.exists());
    }

    #[test]
    fn corrupted_entry_is_removed_not_kept_partial() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        let mut zip = zip::ZipWriter::new(File::create(&pkg).unwrap());
        let stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o755);
        zip.start_file("app", stored).unwrap();
        zip.write_all(b"binary").unwrap();
        zip.start_file("data.bin", stored).unwrap();
        zip.write_all(b"GOODGOODGOODGOOD").unwrap();
        zip.finish().unwrap();

        // Flip one stored byte so the CRC check fails at the end of the copy.
        let mut bytes = std::fs::read(&pkg).unwrap();
        let at = bytes
            .windows(16)
            .position(|w| w == b"GOODGOODGOODGOOD")
            .unwrap();
        bytes[at] = b'X';
        std::fs::write(&pkg, &bytes).unwrap();

        let extracted = extract_package(&pkg).unwrap();
        assert_eq!(extracted.files(), 1);
        assert_eq!(extracted.skipped(), 1);
        assert!(extracted.path().join("app").exists());
        assert!(!extracted.path().join("data.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unix_mode_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("pkg.zip");
        write_zip(&pkg, &[("app", b"binary")]);

        let extracted = extract_package(&pkg).unwrap();
        assert!(crate::platform::is_executable(&extracted.path().join("app")));
    }
}
