//! Loads, validates, and stages the service and function descriptors.

use crate::digest::file_digest;
use crate::layout::PackageLayout;
use crate::registry::DependencyRegistry;
use crate::PackageError;
use nfpack_schema::{
    typed_view, DescriptorError, DescriptorFile, FunctionDescriptor, PackageContentEntry,
    SchemaKind, SchemaValidator, ServiceDescriptor, FUNCTION_DESCRIPTOR_CONTENT_TYPE,
    SERVICE_DESCRIPTOR_CONTENT_TYPE,
};
use nfpack_workspace::Project;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoadedService {
    pub descriptor: ServiceDescriptor,
    pub entry: PackageContentEntry,
}

#[derive(Debug, Clone)]
pub struct LoadedFunction {
    pub descriptor: FunctionDescriptor,
    pub entry: PackageContentEntry,
    /// Function directory name, or the FunctionId for cached descriptors.
    pub label: String,
    /// Directory relative artifact references resolve against.
    pub base_dir: Option<PathBuf>,
}

pub struct DescriptorCollector<'a> {
    layout: &'a PackageLayout,
    validator: &'a dyn SchemaValidator,
    extension: &'a str,
}

impl<'a> DescriptorCollector<'a> {
    pub fn new(
        layout: &'a PackageLayout,
        validator: &'a dyn SchemaValidator,
        extension: &'a str,
    ) -> Self {
        Self {
            layout,
            validator,
            extension,
        }
    }

    /// Load the project's single service descriptor, register every function
    /// it references, and stage a copy under `service_descriptors/`.
    ///
    /// Nothing is written when the descriptor is missing, ambiguous,
    /// unparsable, or invalid.
    pub fn load_service_descriptor(
        &self,
        project: &Project,
        registry: &mut DependencyRegistry,
    ) -> Result<LoadedService, PackageError> {
        let file = DescriptorFile::locate(&project.service_dir(), self.extension)?;
        let value = self.parse_and_validate(&file, SchemaKind::ServiceDescriptor)?;
        let descriptor: ServiceDescriptor = typed_view(&value, &file.display_path())?;

        for id in descriptor.referenced_functions() {
            if registry.register(&id) {
                debug!("service requires {id}");
            }
        }

        let entry = self.stage(
            &self.layout.service_descriptors_dir(),
            &file.file_name,
            &value,
            SERVICE_DESCRIPTOR_CONTENT_TYPE,
        )?;
        info!(
            "packaged service descriptor {} ({} function references)",
            file.display_path(),
            registry.len()
        );
        Ok(LoadedService { descriptor, entry })
    }

    /// Load one function descriptor and stage it if the service requires it.
    ///
    /// Returns `Ok(None)` when the descriptor's FunctionId is not referenced
    /// by the service descriptor or was already packaged.
    pub fn load_function_descriptor(
        &self,
        file: &DescriptorFile,
        registry: &mut DependencyRegistry,
    ) -> Result<Option<LoadedFunction>, PackageError> {
        let value = self.parse_and_validate(file, SchemaKind::FunctionDescriptor)?;
        let descriptor: FunctionDescriptor = typed_view(&value, &file.display_path())?;
        let id = descriptor.function_id();

        if !registry.is_registered(&id) {
            warn!(
                "function descriptor {} ({id}) is not referenced by the service descriptor, skipping",
                file.display_path()
            );
            return Ok(None);
        }
        if !registry.mark_packaged(&id) {
            warn!(
                "function descriptor {} ({id}) is already packaged, skipping",
                file.display_path()
            );
            return Ok(None);
        }

        let dir = self.layout.function_descriptors_dir();
        let file_name = if dir.join(&file.file_name).exists() {
            let renamed = format!("{id}-{}", file.file_name);
            warn!(
                "function descriptor name '{}' already used in package, storing {id} as '{renamed}'",
                file.file_name
            );
            renamed
        } else {
            file.file_name.clone()
        };
        let entry = self.stage(&dir, &file_name, &value, FUNCTION_DESCRIPTOR_CONTENT_TYPE)?;
        info!("packaged function descriptor {id}");

        Ok(Some(LoadedFunction {
            descriptor,
            entry,
            label: file.label.clone(),
            base_dir: file.base_dir.clone(),
        }))
    }

    fn parse_and_validate(
        &self,
        file: &DescriptorFile,
        kind: SchemaKind,
    ) -> Result<Value, PackageError> {
        let value = file.parse()?;
        if let Err(e) = self.validator.validate(kind, &value) {
            let reason = e.violations.join("; ");
            error!("invalid {kind} {}: {reason}", file.display_path());
            return Err(DescriptorError::SchemaInvalid {
                path: file.display_path(),
                reason,
            }
            .into());
        }
        Ok(value)
    }

    /// Write the re-serialized descriptor into `dir` and return its entry.
    fn stage(
        &self,
        dir: &Path,
        file_name: &str,
        value: &Value,
        content_type: &str,
    ) -> Result<PackageContentEntry, PackageError> {
        let path = dir.join(file_name);
        let yaml = serde_yaml::to_string(value)?;
        self.layout.write_file(&path, yaml.as_bytes())?;
        Ok(PackageContentEntry {
            content_type: content_type.to_owned(),
            name: self.layout.content_name(&path),
            hash: file_digest(&path)?,
        })
    }
}
