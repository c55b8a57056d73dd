use crate::PackageError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

pub const META_INF_DIR: &str = "META-INF";
pub const MANIFEST_FILE: &str = "MANIFEST.MF";
pub const SERVICE_DESCRIPTORS_DIR: &str = "service_descriptors";
pub const FUNCTION_DESCRIPTORS_DIR: &str = "function_descriptors";

/// Directory layout of a package tree before it is archived.
///
/// ```text
/// <root>/META-INF/MANIFEST.MF
/// <root>/service_descriptors/<file>
/// <root>/function_descriptors/<file>
/// <root>/<format>_files/<function>/...
/// ```
#[derive(Debug, Clone)]
pub struct PackageLayout {
    root: PathBuf,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Prepare the package tree at `root`.
    ///
    /// An explicit destination must be absent or empty. The default
    /// destination (the project's `target` directory) is wiped and recreated.
    pub fn prepare(root: impl Into<PathBuf>, explicit: bool) -> Result<Self, PackageError> {
        let root = root.into();
        if root.exists() {
            if explicit {
                if fs::read_dir(&root)?.next().is_some() {
                    return Err(PackageError::DestinationNotEmpty(root));
                }
            } else {
                debug!("removing previous package tree {}", root.display());
                fs::remove_dir_all(&root)?;
            }
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn meta_inf_dir(&self) -> PathBuf {
        self.root.join(META_INF_DIR)
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.meta_inf_dir().join(MANIFEST_FILE)
    }

    #[inline]
    pub fn service_descriptors_dir(&self) -> PathBuf {
        self.root.join(SERVICE_DESCRIPTORS_DIR)
    }

    #[inline]
    pub fn function_descriptors_dir(&self) -> PathBuf {
        self.root.join(FUNCTION_DESCRIPTORS_DIR)
    }

    /// Directory receiving the staged artifacts of one function.
    #[inline]
    pub fn artifact_dir(&self, image_format: &str, function: &str) -> PathBuf {
        self.root.join(format!("{image_format}_files")).join(function)
    }

    #[inline]
    pub fn archive_path(&self, package_name: &str) -> PathBuf {
        self.root
            .join(format!("{package_name}.{}", crate::ARCHIVE_EXTENSION))
    }

    /// Package-content name of a file inside the tree: `/` plus the
    /// root-relative path with `/` separators.
    pub fn content_name(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/{}", parts.join("/"))
    }

    /// Atomically write `content` to `path`, creating parent directories.
    pub fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), PackageError> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PackageError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        let layout = PackageLayout::new("/out");
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/out/META-INF/MANIFEST.MF")
        );
        assert_eq!(
            layout.artifact_dir("qcow2", "firewall"),
            PathBuf::from("/out/qcow2_files/firewall")
        );
        assert_eq!(
            layout.archive_path("eu.example.demo.0.1"),
            PathBuf::from("/out/eu.example.demo.0.1.nfpkg")
        );
    }

    #[test]
    fn content_name_is_rooted() {
        let layout = PackageLayout::new("/out");
        assert_eq!(
            layout.content_name(Path::new("/out/raw_files/fw/disk/a.img")),
            "/raw_files/fw/disk/a.img"
        );
    }

    #[test]
    fn explicit_destination_must_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("leftover"), "x").unwrap();
        assert!(matches!(
            PackageLayout::prepare(&dest, true),
            Err(PackageError::DestinationNotEmpty(_))
        ));
        assert!(dest.join("leftover").exists());
    }

    #[test]
    fn explicit_destination_created_or_reused_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh");
        PackageLayout::prepare(&fresh, true).unwrap();
        assert!(fresh.is_dir());

        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        PackageLayout::prepare(&empty, true).unwrap();
    }

    #[test]
    fn default_destination_is_wiped() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(target.join("old")).unwrap();
        fs::write(target.join("old/file"), "x").unwrap();
        let layout = PackageLayout::prepare(&target, false).unwrap();
        assert!(layout.root().is_dir());
        assert!(!target.join("old").exists());
    }

    #[test]
    fn write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PackageLayout::new(dir.path());
        layout.write_file(&layout.manifest_path(), b"name: x\n").unwrap();
        assert_eq!(fs::read(layout.manifest_path()).unwrap(), b"name: x\n");
    }
}
