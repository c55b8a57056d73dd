use crate::types::FunctionId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image format used when a deployment unit does not declare one.
pub const DEFAULT_IMAGE_FORMAT: &str = "raw";

/// `vm_image_format` marking an image that is pulled at deployment time.
pub const CONTAINER_IMAGE_FORMAT: &str = "docker";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing directory '{}'", .0.display())]
    MissingDirectory(PathBuf),
    #[error("missing descriptor file in '{}': a file with '{extension}' extension is expected", .dir.display())]
    MissingFile { dir: PathBuf, extension: String },
    #[error("multiple descriptor files found in '{}' ({count} files with '{extension}' extension), only one is allowed", .dir.display())]
    MultipleFiles {
        dir: PathBuf,
        extension: String,
        count: usize,
    },
    #[error("failed to parse descriptor '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("descriptor '{path}' failed schema validation: {reason}")]
    SchemaInvalid { path: String, reason: String },
}

/// A descriptor file as found on disk or in the workspace cache.
///
/// `label` names the unit the descriptor belongs to (function directory name
/// or cache key) and `base_dir`, when present, is the directory relative
/// artifact references are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFile {
    pub label: String,
    pub file_name: String,
    pub content: String,
    pub base_dir: Option<PathBuf>,
}

impl DescriptorFile {
    /// Read the single descriptor with the given extension from `dir`.
    pub fn locate(dir: &Path, extension: &str) -> Result<Self, DescriptorError> {
        let path = locate_single_descriptor(dir, extension)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read_to_string(&path)?;
        Ok(Self {
            label,
            file_name,
            content,
            base_dir: Some(dir.to_path_buf()),
        })
    }

    /// Display path used in log and error messages: `<label>/<file>`.
    pub fn display_path(&self) -> String {
        if self.label.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.label, self.file_name)
        }
    }

    pub fn parse(&self) -> Result<serde_yaml::Value, DescriptorError> {
        serde_yaml::from_str(&self.content).map_err(|source| DescriptorError::Parse {
            path: self.display_path(),
            source,
        })
    }
}

/// Find the one regular file in `dir` whose name ends with `extension`.
///
/// Zero or several candidates are both errors; the directory is never
/// modified.
pub fn locate_single_descriptor(dir: &Path, extension: &str) -> Result<PathBuf, DescriptorError> {
    if !dir.is_dir() {
        return Err(DescriptorError::MissingDirectory(dir.to_path_buf()));
    }
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && entry.file_name().to_string_lossy().ends_with(extension) {
            candidates.push(path);
        }
    }
    match candidates.len() {
        0 => Err(DescriptorError::MissingFile {
            dir: dir.to_path_buf(),
            extension: extension.to_owned(),
        }),
        1 => Ok(candidates.remove(0)),
        count => Err(DescriptorError::MultipleFiles {
            dir: dir.to_path_buf(),
            extension: extension.to_owned(),
            count,
        }),
    }
}

/// An explicit `~` reads as the field's default, like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Typed view over a service descriptor. Unknown fields are preserved in the
/// raw mapping and ignored here.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub vendor: String,
    pub name: String,
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub network_functions: Vec<FunctionReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FunctionReference {
    #[serde(default)]
    pub vnf_id: Option<String>,
    pub vnf_vendor: String,
    #[serde(default)]
    pub vnf_name: Option<String>,
    pub vnf_version: String,
}

impl FunctionReference {
    pub fn function_id(&self) -> FunctionId {
        FunctionId::from_parts(
            &self.vnf_vendor,
            self.vnf_name.as_deref().unwrap_or_default(),
            &self.vnf_version,
        )
    }
}

impl ServiceDescriptor {
    pub fn function_id(&self) -> FunctionId {
        FunctionId::from_parts(&self.vendor, &self.name, &self.version)
    }

    /// FunctionIds of every reference with a set, non-empty `vnf_name`, in
    /// declaration order, duplicates included.
    pub fn referenced_functions(&self) -> Vec<FunctionId> {
        self.network_functions
            .iter()
            .filter(|r| r.vnf_name.as_deref().is_some_and(|n| !n.is_empty()))
            .map(FunctionReference::function_id)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub vendor: String,
    pub name: String,
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub virtual_deployment_units: Vec<DeploymentUnit>,
}

impl FunctionDescriptor {
    pub fn function_id(&self) -> FunctionId {
        FunctionId::from_parts(&self.vendor, &self.name, &self.version)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeploymentUnit {
    pub id: String,
    #[serde(default)]
    pub vm_image: Option<String>,
    #[serde(default)]
    pub vm_image_format: Option<String>,
}

impl DeploymentUnit {
    /// The image reference, if set and non-empty.
    pub fn image(&self) -> Option<&str> {
        self.vm_image.as_deref().filter(|s| !s.is_empty())
    }

    pub fn image_format(&self) -> &str {
        self.vm_image_format
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_IMAGE_FORMAT)
    }

    pub fn is_container_image(&self) -> bool {
        self.vm_image_format.as_deref() == Some(CONTAINER_IMAGE_FORMAT)
    }
}

/// Convert an already parsed (and validated) mapping into a typed view.
pub fn typed_view<T: DeserializeOwned>(
    value: &serde_yaml::Value,
    path: &str,
) -> Result<T, DescriptorError> {
    serde_yaml::from_value(value.clone()).map_err(|source| DescriptorError::Parse {
        path: path.to_owned(),
        source,
    })
}

pub fn parse_service_str(input: &str) -> Result<ServiceDescriptor, DescriptorError> {
    serde_yaml::from_str(input).map_err(|source| DescriptorError::Parse {
        path: "<inline>".to_owned(),
        source,
    })
}

pub fn parse_function_str(input: &str) -> Result<FunctionDescriptor, DescriptorError> {
    serde_yaml::from_str(input).map_err(|source| DescriptorError::Parse {
        path: "<inline>".to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NSD: &str = r#"
descriptor_version: "1.0"
vendor: eu.example
name: sample-service
version: "0.1"
network_functions:
  - vnf_id: vnf_fw
    vnf_vendor: eu.example
    vnf_name: firewall
    vnf_version: "0.2"
  - vnf_id: vnf_empty
    vnf_vendor: eu.example
    vnf_name: ""
    vnf_version: "0.1"
connection_points: []
"#;

    #[test]
    fn parses_service_and_skips_unnamed_references() {
        let nsd = parse_service_str(NSD).unwrap();
        assert_eq!(nsd.function_id(), "eu.example.sample-service.0.1");
        assert_eq!(
            nsd.referenced_functions(),
            vec![FunctionId::new("eu.example.firewall.0.2")]
        );
    }

    #[test]
    fn null_fields_read_as_absent() {
        let nsd = parse_service_str(
            "vendor: v\nname: s\nversion: '1.0'\nnetwork_functions:\n  - vnf_vendor: v\n    vnf_name: ~\n    vnf_version: '1.0'\n",
        )
        .unwrap();
        assert_eq!(nsd.network_functions[0].vnf_name, None);
        assert!(nsd.referenced_functions().is_empty());

        let nsd = parse_service_str("vendor: v\nname: s\nversion: '1.0'\nnetwork_functions: ~\n")
            .unwrap();
        assert!(nsd.network_functions.is_empty());

        let vnfd = parse_function_str(
            "vendor: v\nname: f\nversion: '1.0'\nvirtual_deployment_units: ~\n",
        )
        .unwrap();
        assert!(vnfd.virtual_deployment_units.is_empty());
    }

    #[test]
    fn deployment_unit_defaults() {
        let vnfd = parse_function_str(
            r#"
vendor: v
name: f
version: "1.0"
virtual_deployment_units:
  - id: vdu01
    vm_image: images/disk.qcow2
  - id: vdu02
    vm_image: ""
    vm_image_format: docker
"#,
        )
        .unwrap();
        let units = &vnfd.virtual_deployment_units;
        assert_eq!(units[0].image(), Some("images/disk.qcow2"));
        assert_eq!(units[0].image_format(), "raw");
        assert!(!units[0].is_container_image());
        assert_eq!(units[1].image(), None);
        assert!(units[1].is_container_image());
    }

    #[test]
    fn locate_requires_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_single_descriptor(dir.path(), "yml"),
            Err(DescriptorError::MissingFile { .. })
        ));

        fs::write(dir.path().join("a.yml"), "vendor: v").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let found = locate_single_descriptor(dir.path(), "yml").unwrap();
        assert_eq!(found, dir.path().join("a.yml"));

        fs::write(dir.path().join("b.yml"), "vendor: v").unwrap();
        assert!(matches!(
            locate_single_descriptor(dir.path(), "yml"),
            Err(DescriptorError::MultipleFiles { count: 2, .. })
        ));
    }

    #[test]
    fn locate_ignores_subdirectories_with_matching_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.yml")).unwrap();
        fs::write(dir.path().join("f.yml"), "vendor: v").unwrap();
        assert!(locate_single_descriptor(dir.path(), "yml").is_ok());
    }

    #[test]
    fn locate_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            locate_single_descriptor(&missing, "yml"),
            Err(DescriptorError::MissingDirectory(_))
        ));
    }

    #[test]
    fn descriptor_file_records_label_and_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("firewall");
        fs::create_dir(&fw).unwrap();
        fs::write(fw.join("firewall-vnfd.yml"), "vendor: v\n").unwrap();

        let file = DescriptorFile::locate(&fw, "yml").unwrap();
        assert_eq!(file.label, "firewall");
        assert_eq!(file.file_name, "firewall-vnfd.yml");
        assert_eq!(file.base_dir.as_deref(), Some(fw.as_path()));
        assert_eq!(file.display_path(), "firewall/firewall-vnfd.yml");
        assert!(file.parse().unwrap().is_mapping());
    }

    #[test]
    fn parse_error_names_the_file() {
        let file = DescriptorFile {
            label: "bad".to_owned(),
            file_name: "bad.yml".to_owned(),
            content: "vendor: [unterminated".to_owned(),
            base_dir: None,
        };
        let err = file.parse().unwrap_err();
        assert!(err.to_string().contains("bad/bad.yml"));
    }
}
