//! # Archive Staging
//!
//! Unpacks an uploaded bundle into a private working directory.
//!
//! The bundle is first copied to `<temp>/<timestamp>-ImportProject.zip`,
//! then exploded into `<temp>/<timestamp>-ImportProject/`. The timestamp has
//! microsecond resolution so concurrent imports get distinct paths. Both
//! paths are removed when the [`ArchiveStaging`] guard drops, whatever the
//! outcome of the import.

use crate::primitives::STAGING_SUFFIX;
use crate::{ImportError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// An unpacked bundle. Dropping it deletes the staged files.
#[derive(Debug)]
pub struct ArchiveStaging {
    archive_copy: PathBuf,
    directory: PathBuf,
}

impl ArchiveStaging {
    /// Copy `bundle` under `temp_dir` and unpack it there.
    ///
    /// Fails with `ImportError::Structural` if the bundle is not a readable
    /// zip archive or contains entries escaping the staging directory.
    pub fn unpack(bundle: &Path, temp_dir: &Path) -> Result<Self> {
        if !bundle.is_file() {
            return Err(ImportError::Structural(format!(
                "{} is not a file",
                bundle.display()
            )));
        }
        fs::create_dir_all(temp_dir).map_err(|e| ImportError::io(temp_dir, e))?;

        let stem = format!(
            "{}-{}",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S_%6f"),
            STAGING_SUFFIX
        );
        let staging = Self {
            archive_copy: temp_dir.join(format!("{}.zip", stem)),
            directory: temp_dir.join(stem),
        };

        fs::copy(bundle, &staging.archive_copy)
            .map_err(|e| ImportError::io(&staging.archive_copy, e))?;
        fs::create_dir(&staging.directory).map_err(|e| ImportError::io(&staging.directory, e))?;
        staging.extract()?;

        tracing::debug!(
            bundle = %bundle.display(),
            directory = %staging.directory.display(),
            "bundle unpacked"
        );
        Ok(staging)
    }

    fn extract(&self) -> Result<()> {
        let file =
            fs::File::open(&self.archive_copy).map_err(|e| ImportError::io(&self.archive_copy, e))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| ImportError::Structural(format!("Failed to read archive: {}", e)))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                ImportError::Structural(format!("Failed to read archive entry: {}", e))
            })?;
            let relative = entry.enclosed_name().ok_or_else(|| {
                ImportError::Structural(format!("Unsafe path in archive: {}", entry.name()))
            })?;
            let out_path = self.directory.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| ImportError::io(&out_path, e))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| ImportError::io(parent, e))?;
            }
            let mut outfile =
                fs::File::create(&out_path).map_err(|e| ImportError::io(&out_path, e))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| ImportError::io(&out_path, e))?;
        }
        Ok(())
    }

    /// Root of the unpacked tree.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn archive_copy(&self) -> &Path {
        &self.archive_copy
    }
}

impl Drop for ArchiveStaging {
    fn drop(&mut self) {
        if self.archive_copy.exists() {
            if let Err(e) = fs::remove_file(&self.archive_copy) {
                tracing::warn!(path = %self.archive_copy.display(), error = %e, "failed to remove staged archive");
            }
        }
        if self.directory.exists() {
            if let Err(e) = fs::remove_dir_all(&self.directory) {
                tracing::warn!(path = %self.directory.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(content).expect("write entry");
        }
        writer.finish().expect("finish zip");
    }

    #[test]
    fn unpack_and_cleanup_on_drop() {
        let dir = TempDir::new().expect("tempdir");
        let bundle = dir.path().join("bundle.zip");
        write_zip(&bundle, &[("demo/project.json", b"{}"), ("demo/op/operation.json", b"{}")]);
        let temp = dir.path().join("tmp");

        let (directory, copy) = {
            let staging = ArchiveStaging::unpack(&bundle, &temp).expect("unpack");
            assert!(staging.directory().join("demo/op/operation.json").exists());
            assert!(staging.archive_copy().exists());
            let name = staging
                .directory()
                .file_name()
                .expect("name")
                .to_string_lossy()
                .to_string();
            assert!(name.ends_with(STAGING_SUFFIX));
            (
                staging.directory().to_path_buf(),
                staging.archive_copy().to_path_buf(),
            )
        };

        assert!(!directory.exists());
        assert!(!copy.exists());
        assert!(bundle.exists());
    }

    #[test]
    fn non_zip_is_structural_and_cleaned() {
        let dir = TempDir::new().expect("tempdir");
        let bundle = dir.path().join("bundle.zip");
        fs::write(&bundle, b"definitely not a zip").expect("write");
        let temp = dir.path().join("tmp");

        assert!(matches!(
            ArchiveStaging::unpack(&bundle, &temp),
            Err(ImportError::Structural(_))
        ));
        let leftovers = fs::read_dir(&temp).expect("read tmp").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_bundle_is_structural() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            ArchiveStaging::unpack(&dir.path().join("absent.zip"), dir.path()),
            Err(ImportError::Structural(_))
        ));
    }
}
