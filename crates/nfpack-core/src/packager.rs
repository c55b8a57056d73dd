use crate::archive::write_archive;
use crate::artifacts::{ArtifactProbe, ArtifactResolver, HttpProbe};
use crate::collector::DescriptorCollector;
use crate::digest::file_digest;
use crate::layout::PackageLayout;
use crate::registry::DependencyRegistry;
use crate::sources::{self, workspace_sources, CacheSource, DescriptorSource};
use crate::{PackageError, ARCHIVE_EXTENSION};
use nfpack_schema::{
    ArtifactDependency, DescriptorError, DescriptorFile, Digest, GeneralDescription,
    PackageContentEntry, PackageDescriptor, PackageResolver, SchemaKind, SchemaValidator,
    StructuralValidator,
};
use nfpack_workspace::{DescriptorCache, FsDescriptorCache, Project, Workspace};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// `descriptor_version` written into every package descriptor.
pub const PACKAGE_DESCRIPTOR_VERSION: &str = "1.0";

/// The archive produced by [`Packager::generate_package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArtifact {
    pub path: PathBuf,
    pub digest: Digest,
}

#[derive(Debug, Default)]
struct Sections {
    content: Vec<PackageContentEntry>,
    resolvers: Vec<PackageResolver>,
    artifacts: Vec<ArtifactDependency>,
    entry_service_template: String,
}

/// Builds one package from one project.
///
/// [`build_descriptor`](Self::build_descriptor) stages the descriptors and
/// artifacts into the package tree and writes `META-INF/MANIFEST.MF`;
/// [`generate_package`](Self::generate_package) then archives the tree.
pub struct Packager {
    project: Project,
    layout: PackageLayout,
    extension: String,
    validator: Box<dyn SchemaValidator>,
    cache: Rc<dyn DescriptorCache>,
    sources: Vec<Box<dyn DescriptorSource>>,
    probe: Box<dyn ArtifactProbe>,
    registry: DependencyRegistry,
    descriptor: Option<PackageDescriptor>,
}

impl Packager {
    /// Prepare a packager for `project`.
    ///
    /// Without `destination` the package tree is the project's `target`
    /// directory, wiped first. An explicit destination must be absent or
    /// empty.
    pub fn new(
        workspace: &Workspace,
        project: Project,
        destination: Option<&Path>,
    ) -> Result<Self, PackageError> {
        let layout = match destination {
            Some(dest) => PackageLayout::prepare(dest, true)?,
            None => PackageLayout::prepare(project.target_dir(), false)?,
        };
        debug!("package tree: {}", layout.root().display());

        let cache: Rc<dyn DescriptorCache> = Rc::new(FsDescriptorCache::for_workspace(workspace));
        let sources = workspace_sources(workspace, &cache);
        Ok(Self {
            project,
            layout,
            extension: workspace.descriptor_extension().to_owned(),
            validator: Box::new(StructuralValidator::new(
                &workspace.config().schemas_remote_master,
            )),
            cache,
            sources,
            probe: Box::new(HttpProbe::new()),
            registry: DependencyRegistry::new(),
            descriptor: None,
        })
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Box<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the descriptor cache. The source chain is reset to the new
    /// cache alone.
    #[must_use]
    pub fn with_cache(mut self, cache: Rc<dyn DescriptorCache>) -> Self {
        self.sources = vec![Box::new(CacheSource::new(Rc::clone(&cache)))];
        self.cache = cache;
        self
    }

    /// Set the sources tried after the cache, in order.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Box<dyn DescriptorSource>>) -> Self {
        let mut chain: Vec<Box<dyn DescriptorSource>> =
            vec![Box::new(CacheSource::new(Rc::clone(&self.cache)))];
        chain.extend(sources);
        self.sources = chain;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn ArtifactProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    pub fn descriptor(&self) -> Option<&PackageDescriptor> {
        self.descriptor.as_ref()
    }

    /// Build and validate the package descriptor, then write it to
    /// `META-INF/MANIFEST.MF`. An invalid descriptor is discarded and
    /// never written.
    pub fn build_descriptor(&mut self) -> Result<&PackageDescriptor, PackageError> {
        if self.descriptor.is_none() {
            let descriptor = self.assemble()?;
            self.descriptor = Some(descriptor);
        }
        self.descriptor
            .as_ref()
            .ok_or(PackageError::MissingPackageDescriptor)
    }

    /// Archive the package tree as `<name>.nfpkg`, defaulting the name to
    /// `<vendor>.<name>.<version>`.
    pub fn generate_package(&self, name: Option<&str>) -> Result<PackageArtifact, PackageError> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or(PackageError::MissingPackageDescriptor)?;
        let suffix = format!(".{ARCHIVE_EXTENSION}");
        let name = name.map_or_else(
            || descriptor.package_name(),
            |n| n.strip_suffix(&suffix).unwrap_or(n).to_owned(),
        );
        let path = self.layout.archive_path(&name);
        write_archive(self.layout.root(), &path)?;
        let digest = file_digest(&path)?;
        info!("package {} ({digest})", path.display());
        Ok(PackageArtifact { path, digest })
    }

    /// [`build_descriptor`](Self::build_descriptor) followed by
    /// [`generate_package`](Self::generate_package).
    pub fn package(&mut self, name: Option<&str>) -> Result<PackageArtifact, PackageError> {
        self.build_descriptor()?;
        self.generate_package(name)
    }

    fn assemble(&mut self) -> Result<PackageDescriptor, PackageError> {
        let sections = self.package_content()?;
        let general = self.general_description(&sections)?;
        let descriptor = PackageDescriptor {
            general,
            package_content: sections.content,
            package_resolvers: sections.resolvers,
            package_dependencies: Vec::new(),
            artifact_dependencies: sections.artifacts,
        };

        let value = descriptor.to_value()?;
        if let Err(e) = self.validator.validate(SchemaKind::PackageDescriptor, &value) {
            error!("package descriptor failed validation: {e}");
            return Err(PackageError::InvalidPackageDescriptor(e));
        }
        self.layout
            .write_file(&self.layout.manifest_path(), descriptor.to_yaml()?.as_bytes())?;
        info!(
            "wrote package descriptor ({} content entries)",
            descriptor.package_content.len()
        );
        Ok(descriptor)
    }

    fn general_description(&self, sections: &Sections) -> Result<GeneralDescription, PackageError> {
        let config = self.project.config();
        let missing = config.missing_fields();
        if !missing.is_empty() {
            error!("please define {} in project.yml", missing.join(", "));
            return Err(PackageError::IncompleteProjectDescriptor(missing));
        }
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(GeneralDescription {
            descriptor_version: PACKAGE_DESCRIPTOR_VERSION.to_owned(),
            schema: self.validator.remote_schema(SchemaKind::PackageDescriptor),
            sealed: sections.artifacts.is_empty(),
            entry_service_template: sections.entry_service_template.clone(),
            vendor: field(&config.vendor),
            name: field(&config.name),
            version: field(&config.version),
            maintainer: field(&config.maintainer),
            description: field(&config.description),
        })
    }

    /// Stage the service descriptor, every referenced function descriptor,
    /// and their artifacts.
    fn package_content(&mut self) -> Result<Sections, PackageError> {
        let collector =
            DescriptorCollector::new(&self.layout, self.validator.as_ref(), &self.extension);
        let resolver = ArtifactResolver::new(&self.layout, self.probe.as_ref());
        let mut sections = Sections::default();

        let service = collector.load_service_descriptor(&self.project, &mut self.registry)?;
        sections.entry_service_template = service.entry.name.clone();
        sections.content.push(service.entry);

        for dir in self.project.function_dirs()? {
            let file = match DescriptorFile::locate(&dir, &self.extension) {
                Ok(file) => file,
                Err(
                    e @ (DescriptorError::MissingFile { .. } | DescriptorError::MultipleFiles { .. }),
                ) => {
                    warn!("skipping function directory {}: {e}", dir.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            package_function(&collector, &resolver, &mut self.registry, &file, &mut sections)?;
        }

        let pending = self.registry.unresolved();
        if pending.is_empty() {
            return Ok(sections);
        }

        info!(
            "resolving {} function descriptors not found in the project",
            pending.len()
        );
        let resolution = sources::resolve(
            &pending,
            &self.sources,
            self.cache.as_ref(),
            self.validator.as_ref(),
            &self.extension,
        )?;
        if !resolution.unresolved.is_empty() {
            error!("unable to solve dependencies");
            return Err(PackageError::UnresolvedDependencies(resolution.unresolved));
        }
        sections.resolvers = resolution.resolvers;

        for id in &resolution.resolved {
            match self.cache.load(id) {
                Ok(Some(file)) => {
                    package_function(&collector, &resolver, &mut self.registry, &file, &mut sections)?;
                }
                Ok(None) => warn!("{id} is missing from the workspace cache"),
                Err(e) => warn!("failed to load {id} from the workspace cache: {e}"),
            }
        }

        let unresolved = self.registry.unresolved();
        if !unresolved.is_empty() {
            error!("unable to solve dependencies");
            return Err(PackageError::UnresolvedDependencies(unresolved));
        }
        Ok(sections)
    }
}

/// Package one function descriptor file and its artifacts. Invalid
/// descriptors are logged and skipped.
fn package_function(
    collector: &DescriptorCollector<'_>,
    resolver: &ArtifactResolver<'_>,
    registry: &mut DependencyRegistry,
    file: &DescriptorFile,
    sections: &mut Sections,
) -> Result<(), PackageError> {
    let loaded = match collector.load_function_descriptor(file, registry) {
        Ok(Some(loaded)) => loaded,
        Ok(None) => return Ok(()),
        Err(PackageError::Descriptor(
            e @ (DescriptorError::Parse { .. } | DescriptorError::SchemaInvalid { .. }),
        )) => {
            error!("failed to package function descriptor {}: {e}", file.display_path());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    sections.content.push(loaded.entry.clone());
    let outcome = resolver.resolve(&loaded)?;
    sections.content.extend(outcome.entries);
    for dep in outcome.dependencies {
        if sections.artifacts.iter().any(|d| d.name == dep.name) {
            debug!("artifact dependency {} already recorded", dep.name);
        } else {
            sections.artifacts.push(dep);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfpack_schema::ValidationError;
    use nfpack_workspace::{MemoryDescriptorCache, ProjectConfig, WorkspaceConfig};
    use std::fs;

    struct RejectPackages;

    impl SchemaValidator for RejectPackages {
        fn validate(
            &self,
            kind: SchemaKind,
            _descriptor: &serde_yaml::Value,
        ) -> Result<(), ValidationError> {
            if kind == SchemaKind::PackageDescriptor {
                Err(ValidationError {
                    kind,
                    violations: vec!["rejected".to_owned()],
                })
            } else {
                Ok(())
            }
        }

        fn remote_schema(&self, kind: SchemaKind) -> String {
            kind.relative_path().to_owned()
        }
    }

    fn config() -> ProjectConfig {
        ProjectConfig {
            vendor: Some("eu.example".to_owned()),
            name: Some("demo".to_owned()),
            version: Some("0.1".to_owned()),
            maintainer: Some("Jane Doe".to_owned()),
            description: Some("demo service".to_owned()),
        }
    }

    fn project(root: &Path, config: ProjectConfig) -> Project {
        let nsd = root.join("sources/nsd");
        fs::create_dir_all(&nsd).unwrap();
        fs::write(
            nsd.join("nsd.yml"),
            "vendor: eu.example\nname: demo\nversion: '0.1'\nnetwork_functions: []\n",
        )
        .unwrap();
        Project::new(root, config)
    }

    fn packager(dir: &Path, config: ProjectConfig) -> Packager {
        let workspace = Workspace::new(dir.join("ws"), WorkspaceConfig::new("test"));
        Packager::new(&workspace, project(&dir.join("prj"), config), None)
            .unwrap()
            .with_cache(Rc::new(MemoryDescriptorCache::new()))
    }

    #[test]
    fn service_without_references_is_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let mut packager = packager(dir.path(), config());
        let descriptor = packager.build_descriptor().unwrap().clone();
        assert!(descriptor.general.sealed);
        assert_eq!(descriptor.general.descriptor_version, "1.0");
        assert_eq!(
            descriptor.general.entry_service_template,
            "/service_descriptors/nsd.yml"
        );
        assert!(descriptor
            .general
            .schema
            .ends_with("package-descriptor/pd-schema.yml"));
        assert_eq!(descriptor.package_content.len(), 1);
        assert!(packager.layout().manifest_path().is_file());
    }

    #[test]
    fn missing_project_fields_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.maintainer = None;
        config.description = None;
        let mut packager = packager(dir.path(), config);
        let err = packager.build_descriptor().unwrap_err();
        assert_eq!(
            err.to_string(),
            "please define maintainer, description in project.yml"
        );
        assert!(!packager.layout().manifest_path().exists());
    }

    #[test]
    fn invalid_package_descriptor_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut packager = packager(dir.path(), config()).with_validator(Box::new(RejectPackages));
        assert!(matches!(
            packager.build_descriptor(),
            Err(PackageError::InvalidPackageDescriptor(_))
        ));
        assert!(packager.descriptor().is_none());
        assert!(!packager.layout().manifest_path().exists());
    }

    #[test]
    fn generate_without_descriptor_fails() {
        let dir = tempfile::tempdir().unwrap();
        let packager = packager(dir.path(), config());
        assert!(matches!(
            packager.generate_package(None),
            Err(PackageError::MissingPackageDescriptor)
        ));
    }

    #[test]
    fn package_name_defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut packager = packager(dir.path(), config());
        let artifact = packager.package(None).unwrap();
        assert_eq!(
            artifact.path.file_name().unwrap(),
            "eu.example.demo.0.1.nfpkg"
        );
        assert_eq!(artifact.digest, file_digest(&artifact.path).unwrap());

        let custom = packager.generate_package(Some("custom.nfpkg")).unwrap();
        assert_eq!(custom.path.file_name().unwrap(), "custom.nfpkg");
    }

    #[test]
    fn build_descriptor_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut packager = packager(dir.path(), config());
        let first = packager.build_descriptor().unwrap().clone();
        let second = packager.build_descriptor().unwrap().clone();
        assert_eq!(first, second);
    }
}
