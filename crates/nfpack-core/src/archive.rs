//! Package archive: a gzip-compressed tar of the package tree.
//!
//! Entries are written in sorted path order with zeroed mtime, uid and gid so
//! the same tree always yields the same archive bytes.

use crate::digest::bytes_digest;
use crate::layout::{MANIFEST_FILE, META_INF_DIR};
use crate::PackageError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nfpack_schema::PackageDescriptor;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

pub const ARCHIVE_EXTENSION: &str = "nfpkg";

/// Write every file and directory under `source_dir` into `archive_path`,
/// excluding the archive itself. The archive is written to a temporary file
/// in the same directory and renamed into place.
pub fn write_archive(source_dir: &Path, archive_path: &Path) -> Result<(), PackageError> {
    let mut entries: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.path() == archive_path {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| PackageError::Archive(format!("path strip: {e}")))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let ft = entry.file_type();
        if ft.is_file() || ft.is_dir() {
            entries.push((rel, entry.path().to_path_buf(), ft.is_dir()));
        } else {
            debug!("skipping non-regular entry {rel}");
        }
    }

    let parent = archive_path.parent().unwrap_or(source_dir);
    let tmp = NamedTempFile::new_in(parent)?;
    let encoder = GzEncoder::new(tmp, Compression::default());
    let mut ar = tar::Builder::new(encoder);

    for (rel, full, is_dir) in &entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        if *is_dir {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            header.set_cksum();
            ar.append_data(&mut header, format!("{rel}/"), &[] as &[u8])?;
        } else {
            let data = fs::read(full)?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            header.set_cksum();
            ar.append_data(&mut header, rel, data.as_slice())?;
        }
    }

    let encoder = ar.into_inner()?;
    let tmp = encoder.finish()?;
    tmp.as_file().sync_all()?;
    tmp.persist(archive_path)
        .map_err(|e| PackageError::Io(e.error))?;
    debug!(
        "wrote {} entries to {}",
        entries.len(),
        archive_path.display()
    );
    Ok(())
}

/// Read back every regular file of an archive as `(path, bytes)`, in
/// archive order.
pub fn read_archive(archive_path: &Path) -> Result<Vec<(String, Vec<u8>)>, PackageError> {
    let file = File::open(archive_path)?;
    let mut ar = tar::Archive::new(GzDecoder::new(file));
    let mut files = Vec::new();
    for entry in ar.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.push((path, data));
    }
    Ok(files)
}

/// Check an archive against its own manifest: every package-content entry
/// must be present with the recorded digest.
///
/// Returns the manifest on success.
pub fn verify_archive(archive_path: &Path) -> Result<PackageDescriptor, PackageError> {
    let files = read_archive(archive_path)?;
    let manifest_name = format!("{META_INF_DIR}/{MANIFEST_FILE}");
    let manifest = files
        .iter()
        .find(|(p, _)| *p == manifest_name)
        .ok_or(PackageError::MissingPackageDescriptor)?;
    let descriptor = PackageDescriptor::from_yaml(&String::from_utf8_lossy(&manifest.1))?;

    for entry in &descriptor.package_content {
        let Some((_, data)) = files.iter().find(|(p, _)| p == entry.archive_path()) else {
            return Err(PackageError::Archive(format!(
                "'{}' is listed in the manifest but missing from the archive",
                entry.name
            )));
        };
        let actual = bytes_digest(data);
        if actual != entry.hash {
            return Err(PackageError::Archive(format!(
                "digest mismatch for '{}': expected {}, got {actual}",
                entry.name, entry.hash
            )));
        }
    }
    Ok(descriptor)
}
