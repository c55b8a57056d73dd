//! Resolution of the images referenced by deployment units.
//!
//! A `vm_image` is either a remote URL, recorded as an artifact dependency,
//! or a local file or directory staged into `<format>_files/<function>/`.
//! Container images that are not present locally are pulled at deployment
//! time and need nothing staged.

use crate::collector::LoadedFunction;
use crate::digest::file_digest;
use crate::layout::PackageLayout;
use crate::PackageError;
use nfpack_schema::{
    artifact_content_type, ArtifactDependency, Credentials, DeploymentUnit, Digest,
    PackageContentEntry, UNFETCHED_ARTIFACT_DIGEST,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Timeout of the existence check on remote artifacts.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Best-effort existence check for remote artifacts.
pub trait ArtifactProbe {
    fn exists(&self, url: &str) -> bool;
}

/// Probes with an HTTP `HEAD` request.
pub struct HttpProbe {
    agent: ureq::Agent,
}

impl HttpProbe {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(PROBE_TIMEOUT))
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactProbe for HttpProbe {
    fn exists(&self, url: &str) -> bool {
        match self.agent.head(url).call() {
            Ok(_) => true,
            Err(e) => {
                debug!("HEAD {url}: {e}");
                false
            }
        }
    }
}

/// Where a `vm_image` reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    /// An `http`, `https` or `ftp` URL with a host.
    Remote(String),
    Local(PathBuf),
    /// A relative path with no directory to resolve it against.
    Unanchored(String),
}

impl ArtifactRef {
    pub fn classify(reference: &str, base_dir: Option<&Path>) -> Self {
        if let Ok(url) = url::Url::parse(reference) {
            if matches!(url.scheme(), "http" | "https" | "ftp")
                && url.host_str().is_some_and(|h| !h.is_empty())
            {
                return ArtifactRef::Remote(reference.to_owned());
            }
        }
        let path = reference
            .strip_prefix("file://")
            .or_else(|| reference.strip_prefix("file:"))
            .unwrap_or(reference);
        let path = Path::new(path);
        if path.is_absolute() {
            return ArtifactRef::Local(path.to_path_buf());
        }
        match base_dir {
            Some(base) => ArtifactRef::Local(base.join(path)),
            None => ArtifactRef::Unanchored(reference.to_owned()),
        }
    }
}

/// Staged entries and external dependencies of one function.
#[derive(Debug, Default)]
pub struct ArtifactOutcome {
    pub entries: Vec<PackageContentEntry>,
    pub dependencies: Vec<ArtifactDependency>,
}

pub struct ArtifactResolver<'a> {
    layout: &'a PackageLayout,
    probe: &'a dyn ArtifactProbe,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(layout: &'a PackageLayout, probe: &'a dyn ArtifactProbe) -> Self {
        Self { layout, probe }
    }

    pub fn resolve(&self, function: &LoadedFunction) -> Result<ArtifactOutcome, PackageError> {
        let mut outcome = ArtifactOutcome::default();
        let mut staged = StagedFiles::default();
        for unit in &function.descriptor.virtual_deployment_units {
            let Some(image) = unit.image() else {
                continue;
            };
            match ArtifactRef::classify(image, function.base_dir.as_deref()) {
                ArtifactRef::Remote(url) => {
                    if !self.probe.exists(&url) {
                        warn!("failed to verify the existence of vm_image '{url}'");
                    }
                    outcome.dependencies.push(ArtifactDependency {
                        name: format!("{}-{}-vm_image", function.descriptor.name, unit.id),
                        url,
                        hash: Digest::new(UNFETCHED_ARTIFACT_DIGEST),
                        credentials: Credentials::default(),
                    });
                }
                ArtifactRef::Local(path) if path.is_file() => {
                    let dest_dir = self.layout.artifact_dir(unit.image_format(), &function.label);
                    let rel = staged_path(&path, function.base_dir.as_deref());
                    if let Some(dest) = staged.claim(&path, &dest_dir, &unit.id, &rel) {
                        outcome.entries.push(self.stage(unit, &path, &dest)?);
                    }
                }
                ArtifactRef::Local(path) if path.is_dir() => {
                    let dest_dir = self.layout.artifact_dir(unit.image_format(), &function.label);
                    for entry in WalkDir::new(&path).sort_by_file_name() {
                        let entry = entry?;
                        if !entry.file_type().is_file() {
                            continue;
                        }
                        let rel = entry.path().strip_prefix(&path).unwrap_or(entry.path());
                        if let Some(dest) = staged.claim(entry.path(), &dest_dir, &unit.id, rel) {
                            outcome.entries.push(self.stage(unit, entry.path(), &dest)?);
                        }
                    }
                }
                _ if unit.is_container_image() => {
                    debug!("vm_image '{image}' of {} is a container image", unit.id);
                }
                ArtifactRef::Local(path) => {
                    error!(
                        "cannot resolve vm_image '{image}' of {}/{}: '{}' does not exist",
                        function.label,
                        unit.id,
                        path.display()
                    );
                }
                ArtifactRef::Unanchored(_) => {
                    error!(
                        "cannot resolve vm_image '{image}' of {}/{}: no local directory to resolve it in",
                        function.label, unit.id
                    );
                }
            }
        }
        Ok(outcome)
    }

    fn stage(
        &self,
        unit: &DeploymentUnit,
        src: &Path,
        dest: &Path,
    ) -> Result<PackageContentEntry, PackageError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest)?;
        debug!("staged {} as {}", src.display(), dest.display());
        Ok(PackageContentEntry {
            content_type: artifact_content_type(unit.image_format()),
            name: self.layout.content_name(dest),
            hash: file_digest(dest)?,
        })
    }
}

/// Path of a local image below its `<format>_files/<function>` directory:
/// the path relative to the function directory when it lies inside it,
/// otherwise just the file name.
fn staged_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    let inside = base_dir
        .and_then(|base| path.strip_prefix(base).ok())
        .and_then(|rel| {
            let mut normal = PathBuf::new();
            for c in rel.components() {
                match c {
                    Component::Normal(part) => normal.push(part),
                    Component::CurDir => {}
                    _ => return None,
                }
            }
            (!normal.as_os_str().is_empty()).then_some(normal)
        });
    inside.unwrap_or_else(|| path.file_name().map_or_else(|| path.to_path_buf(), PathBuf::from))
}

/// Destinations already staged for one function, mapped to their source.
#[derive(Debug, Default)]
struct StagedFiles {
    sources: HashMap<PathBuf, PathBuf>,
}

impl StagedFiles {
    /// Reserve a destination for `src`. Returns `None` when `src` is
    /// already staged. A destination taken by another file moves the new
    /// one under a `<unit id>/` subdirectory.
    fn claim(
        &mut self,
        src: &Path,
        dest_dir: &Path,
        unit_id: &str,
        rel: &Path,
    ) -> Option<PathBuf> {
        let candidates = [dest_dir.join(rel), dest_dir.join(unit_id).join(rel)];
        for dest in candidates {
            match self.sources.get(&dest) {
                Some(existing) if existing == src => {
                    debug!("{} is already staged", src.display());
                    return None;
                }
                Some(_) => continue,
                None => {
                    self.sources.insert(dest.clone(), src.to_path_buf());
                    return Some(dest);
                }
            }
        }
        error!(
            "cannot stage {}: every destination is taken by another artifact",
            src.display()
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfpack_schema::{parse_function_str, FUNCTION_DESCRIPTOR_CONTENT_TYPE};
    use std::cell::RefCell;

    struct RecordingProbe {
        answer: bool,
        calls: RefCell<Vec<String>>,
    }

    impl RecordingProbe {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ArtifactProbe for RecordingProbe {
        fn exists(&self, url: &str) -> bool {
            self.calls.borrow_mut().push(url.to_owned());
            self.answer
        }
    }

    fn loaded(yaml: &str, base_dir: Option<&Path>) -> LoadedFunction {
        LoadedFunction {
            descriptor: parse_function_str(yaml).unwrap(),
            entry: PackageContentEntry {
                content_type: FUNCTION_DESCRIPTOR_CONTENT_TYPE.to_owned(),
                name: "/function_descriptors/f.yml".to_owned(),
                hash: Digest::new("0"),
            },
            label: "fw".to_owned(),
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }

    #[test]
    fn classify_urls() {
        assert_eq!(
            ArtifactRef::classify("http://images.example/fw.qcow2", None),
            ArtifactRef::Remote("http://images.example/fw.qcow2".to_owned())
        );
        assert_eq!(
            ArtifactRef::classify("ftp://mirror.example/fw.img", None),
            ArtifactRef::Remote("ftp://mirror.example/fw.img".to_owned())
        );
        assert_eq!(
            ArtifactRef::classify("file:///abs/fw.img", None),
            ArtifactRef::Local(PathBuf::from("/abs/fw.img"))
        );
        assert_eq!(
            ArtifactRef::classify("file:images/fw.img", Some(Path::new("/f"))),
            ArtifactRef::Local(PathBuf::from("/f/images/fw.img"))
        );
        assert_eq!(
            ArtifactRef::classify("fw.img", Some(Path::new("/f"))),
            ArtifactRef::Local(PathBuf::from("/f/fw.img"))
        );
        assert_eq!(
            ArtifactRef::classify("fw.img", None),
            ArtifactRef::Unanchored("fw.img".to_owned())
        );
    }

    #[test]
    fn remote_image_becomes_dependency_even_if_probe_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PackageLayout::new(dir.path());
        let probe = RecordingProbe::new(false);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: f2\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: http://images.example/f2.qcow2\n    vm_image_format: qcow2\n",
            None,
        );

        let outcome = resolver.resolve(&function).unwrap();
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.dependencies.len(), 1);
        let dep = &outcome.dependencies[0];
        assert_eq!(dep.name, "f2-vdu01-vm_image");
        assert_eq!(dep.url, "http://images.example/f2.qcow2");
        assert_eq!(dep.hash.as_str(), UNFETCHED_ARTIFACT_DIGEST);
        assert_eq!(dep.credentials.username, "username");
        assert_eq!(probe.calls.borrow().len(), 1);
    }

    #[test]
    fn local_file_is_staged_under_format_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fdir = dir.path().join("src/fw");
        fs::create_dir_all(&fdir).unwrap();
        fs::write(fdir.join("fw.img"), b"image").unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: fw.img\n",
            Some(&fdir),
        );

        let outcome = resolver.resolve(&function).unwrap();
        assert!(outcome.dependencies.is_empty());
        assert_eq!(outcome.entries.len(), 1);
        let entry = &outcome.entries[0];
        assert_eq!(entry.name, "/raw_files/fw/fw.img");
        assert_eq!(entry.content_type, "application/nfv.raw_files");
        assert_eq!(entry.hash, crate::bytes_digest(b"image"));
        assert!(probe.calls.borrow().is_empty());
    }

    #[test]
    fn local_directory_is_staged_recursively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let fdir = dir.path().join("src/fw");
        fs::create_dir_all(fdir.join("disk/nested")).unwrap();
        fs::write(fdir.join("disk/b.img"), b"b").unwrap();
        fs::write(fdir.join("disk/a.img"), b"a").unwrap();
        fs::write(fdir.join("disk/nested/c.img"), b"c").unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: file:disk\n    vm_image_format: qcow2\n",
            Some(&fdir),
        );

        let outcome = resolver.resolve(&function).unwrap();
        let names: Vec<&str> = outcome.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "/qcow2_files/fw/a.img",
                "/qcow2_files/fw/b.img",
                "/qcow2_files/fw/nested/c.img"
            ]
        );
        assert!(layout.root().join("qcow2_files/fw/nested/c.img").is_file());
    }

    #[test]
    fn same_named_files_stay_apart() {
        let dir = tempfile::tempdir().unwrap();
        let fdir = dir.path().join("src/fw");
        fs::create_dir_all(fdir.join("a")).unwrap();
        fs::create_dir_all(fdir.join("b")).unwrap();
        fs::write(fdir.join("a/disk.img"), b"AAAA").unwrap();
        fs::write(fdir.join("b/disk.img"), b"BBBB").unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: a/disk.img\n  - id: vdu02\n    vm_image: b/disk.img\n  - id: vdu03\n    vm_image: ./a/disk.img\n",
            Some(&fdir),
        );

        let outcome = resolver.resolve(&function).unwrap();
        let names: Vec<&str> = outcome.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["/raw_files/fw/a/disk.img", "/raw_files/fw/b/disk.img"]);
        for entry in &outcome.entries {
            let staged = layout.root().join(entry.archive_path());
            assert_eq!(file_digest(&staged).unwrap(), entry.hash);
        }
    }

    #[test]
    fn clashing_destination_moves_under_unit_id() {
        let dir = tempfile::tempdir().unwrap();
        let fdir = dir.path().join("src/fw");
        fs::create_dir_all(fdir.join("disk")).unwrap();
        fs::write(fdir.join("disk/boot.img"), b"from dir").unwrap();
        fs::write(fdir.join("boot.img"), b"from file").unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: disk\n  - id: vdu02\n    vm_image: boot.img\n",
            Some(&fdir),
        );

        let outcome = resolver.resolve(&function).unwrap();
        let names: Vec<&str> = outcome.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["/raw_files/fw/boot.img", "/raw_files/fw/vdu02/boot.img"]);
        assert_eq!(outcome.entries[1].hash, crate::bytes_digest(b"from file"));
    }

    #[test]
    fn staged_path_outside_function_dir_is_file_name() {
        let base = Path::new("/prj/sources/vnf/fw");
        assert_eq!(
            staged_path(&base.join("images/disk.img"), Some(base)),
            PathBuf::from("images/disk.img")
        );
        assert_eq!(
            staged_path(Path::new("/srv/images/disk.img"), Some(base)),
            PathBuf::from("disk.img")
        );
        assert_eq!(
            staged_path(&base.join("../other/disk.img"), Some(base)),
            PathBuf::from("disk.img")
        );
        assert_eq!(
            staged_path(Path::new("/srv/disk.img"), None),
            PathBuf::from("disk.img")
        );
    }

    #[test]
    fn missing_container_image_stages_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: example/firewall:latest\n    vm_image_format: docker\n",
            Some(dir.path()),
        );

        let outcome = resolver.resolve(&function).unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.dependencies.is_empty());
    }

    #[test]
    fn missing_local_image_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PackageLayout::new(dir.path().join("out"));
        let probe = RecordingProbe::new(true);
        let resolver = ArtifactResolver::new(&layout, &probe);
        let function = loaded(
            "vendor: v\nname: fw\nversion: '1.0'\nvirtual_deployment_units:\n  - id: vdu01\n    vm_image: absent.img\n  - id: vdu02\n    vm_image: ''\n",
            Some(dir.path()),
        );

        let outcome = resolver.resolve(&function).unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.dependencies.is_empty());
    }
}
