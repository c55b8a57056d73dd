//! Package descriptor sections, serialized as `META-INF/MANIFEST.MF`.

use crate::types::Digest;
use serde::{Deserialize, Serialize};

/// Digest recorded for artifacts that are referenced by URL and never
/// downloaded. It is a fixed marker, not the digest of the remote content.
///
/// Unlike every other `hash` in a manifest it is not a blake3 digest (it is
/// 32 hex characters, not 64) and cannot be checked against any bytes.
pub const UNFETCHED_ARTIFACT_DIGEST: &str = "02236f2ae558018ed14b5222ef1bd9f1";

pub const SERVICE_DESCRIPTOR_CONTENT_TYPE: &str = "application/nfv.service_descriptors";
pub const FUNCTION_DESCRIPTOR_CONTENT_TYPE: &str = "application/nfv.function_descriptor";

/// Content type of a staged artifact of the given image format.
pub fn artifact_content_type(image_format: &str) -> String {
    format!("application/nfv.{image_format}_files")
}

/// Placeholder credentials attached to resolvers and artifact dependencies.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "username".to_owned(),
            password: "password".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageContentEntry {
    #[serde(rename = "content-type")]
    pub content_type: String,
    /// Archive-relative path with a leading `/`.
    pub name: String,
    pub hash: Digest,
}

impl PackageContentEntry {
    /// The entry name without the leading `/`, as stored in the archive.
    pub fn archive_path(&self) -> &str {
        self.name.trim_start_matches('/')
    }
}

/// A catalogue server needed to resolve at least one function descriptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageResolver {
    pub name: String,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageDependency {
    pub name: String,
    pub group: String,
    pub version: String,
}

/// An artifact referenced by a descriptor but not embedded in the package.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ArtifactDependency {
    pub name: String,
    pub url: String,
    pub hash: Digest,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GeneralDescription {
    pub descriptor_version: String,
    pub schema: String,
    pub sealed: bool,
    pub entry_service_template: String,
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub maintainer: String,
    pub description: String,
}

/// The merged package descriptor: general description plus the content,
/// resolver, dependency, and artifact-dependency sections. Empty optional
/// sections are omitted from the manifest.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageDescriptor {
    #[serde(flatten)]
    pub general: GeneralDescription,
    pub package_content: Vec<PackageContentEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_resolvers: Vec<PackageResolver>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_dependencies: Vec<PackageDependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_dependencies: Vec<ArtifactDependency>,
}

impl PackageDescriptor {
    /// Default archive base name: `<vendor>.<name>.<version>`.
    pub fn package_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.general.vendor, self.general.name, self.general.version
        )
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn to_value(&self) -> Result<serde_yaml::Value, serde_yaml::Error> {
        serde_yaml::to_value(self)
    }

    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }
}
