use crate::WorkspaceError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project descriptor at the project root.
pub const PROJECT_DESCRIPTOR: &str = "project.yml";

/// General-description fields of a project. Every field is optional here;
/// the packager reports the missing ones.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProjectConfig {
    #[serde(default, deserialize_with = "scalar_string")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub maintainer: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub description: Option<String>,
}

/// Accept any YAML scalar as a string so that `version: 0.1` reads as "0.1".
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

impl ProjectConfig {
    /// Names of the general-description fields that are absent or empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("vendor", &self.vendor),
            ("name", &self.name),
            ("version", &self.version),
            ("maintainer", &self.maintainer),
            ("description", &self.description),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().is_none_or(str::is_empty))
        .map(|(k, _)| k)
        .collect()
    }
}

/// Read-only view over a project directory.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: ProjectConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load the project rooted at `root`. The directory must exist and contain
    /// the project descriptor.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let descriptor = root.join(PROJECT_DESCRIPTOR);
        if !root.is_dir() || !descriptor.is_file() {
            return Err(WorkspaceError::InvalidProject(root));
        }
        let content = fs::read_to_string(&descriptor)?;
        let config: ProjectConfig = serde_yaml::from_str(&content)?;
        Ok(Self { root, config })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    #[inline]
    pub fn service_dir(&self) -> PathBuf {
        self.root.join("sources").join("nsd")
    }

    #[inline]
    pub fn functions_dir(&self) -> PathBuf {
        self.root.join("sources").join("vnf")
    }

    /// Default package output directory.
    #[inline]
    pub fn target_dir(&self) -> PathBuf {
        self.root.join("target")
    }

    /// Function directories under `sources/vnf`, sorted by name. A missing
    /// `sources/vnf` yields an empty list.
    pub fn function_dirs(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let base = self.functions_dir();
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&base)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}
