use crate::WorkspaceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Name of the configuration descriptor at the workspace root.
pub const WORKSPACE_DESCRIPTOR: &str = "workspace.yml";

/// Workspace location used when none is given on the command line.
pub const DEFAULT_WORKSPACE_DIR: &str = "~/.nfpack-workspace";

const FUNCTION_CACHE_SUBDIR: &str = "vnfs";

/// A catalogue server entry of the workspace configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CatalogueServer {
    pub id: String,
    pub url: String,
    /// Whether `publish` uploads descriptors to this server.
    #[serde(default)]
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CatalogueServer {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_owned(),
            url: url.trim_end_matches('/').to_owned(),
            publish: false,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn publishing(mut self) -> Self {
        self.publish = true;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WorkspaceConfig {
    #[serde(default = "default_config_version")]
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub catalogue_servers: Vec<CatalogueServer>,
    #[serde(default = "default_descriptor_extension")]
    pub descriptor_extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas_local_master: Option<String>,
    #[serde(default = "default_schemas_remote_master")]
    pub schemas_remote_master: String,
    #[serde(default = "default_catalogues_dir")]
    pub catalogues_dir: String,
    #[serde(default = "default_configuration_dir")]
    pub configuration_dir: String,
    #[serde(default = "default_platforms_dir")]
    pub platforms_dir: String,
}

fn default_config_version() -> String {
    "0.05".to_owned()
}

fn default_descriptor_extension() -> String {
    "yml".to_owned()
}

fn default_schemas_remote_master() -> String {
    "https://raw.githubusercontent.com/sonata-nfv/son-schema/master/".to_owned()
}

fn default_catalogues_dir() -> String {
    "catalogues".to_owned()
}

fn default_configuration_dir() -> String {
    "configuration".to_owned()
}

fn default_platforms_dir() -> String {
    "platforms".to_owned()
}

impl WorkspaceConfig {
    pub fn new(name: &str) -> Self {
        Self {
            version: default_config_version(),
            name: name.to_owned(),
            log_level: None,
            catalogue_servers: Vec::new(),
            descriptor_extension: default_descriptor_extension(),
            schemas_local_master: None,
            schemas_remote_master: default_schemas_remote_master(),
            catalogues_dir: default_catalogues_dir(),
            configuration_dir: default_configuration_dir(),
            platforms_dir: default_platforms_dir(),
        }
    }
}

/// A workspace: configuration plus the directories derived from it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, config: WorkspaceConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load the workspace rooted at `root`. The directory must exist and
    /// contain the workspace descriptor.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let descriptor = root.join(WORKSPACE_DESCRIPTOR);
        if !root.is_dir() || !descriptor.is_file() {
            return Err(WorkspaceError::InvalidWorkspace(root));
        }
        let content = fs::read_to_string(&descriptor)?;
        let config: WorkspaceConfig = serde_yaml::from_str(&content)?;
        Ok(Self { root, config })
    }

    /// Create the workspace directories and write the descriptor.
    pub fn initialize(&self) -> Result<(), WorkspaceError> {
        fs::create_dir_all(self.function_cache_dir())?;
        fs::create_dir_all(self.root.join(&self.config.configuration_dir))?;
        fs::create_dir_all(self.root.join(&self.config.platforms_dir))?;
        self.save()
    }

    pub fn save(&self) -> Result<(), WorkspaceError> {
        fs::create_dir_all(&self.root)?;
        let content = serde_yaml::to_string(&self.config)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.descriptor_path())
            .map_err(|e| WorkspaceError::Io(e.error))?;
        Ok(())
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    #[inline]
    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(WORKSPACE_DESCRIPTOR)
    }

    #[inline]
    pub fn descriptor_extension(&self) -> &str {
        &self.config.descriptor_extension
    }

    #[inline]
    pub fn catalogues_dir(&self) -> PathBuf {
        self.root.join(&self.config.catalogues_dir)
    }

    /// Cache of function descriptors resolved in earlier runs, one
    /// subdirectory per FunctionId.
    #[inline]
    pub fn function_cache_dir(&self) -> PathBuf {
        self.catalogues_dir().join(FUNCTION_CACHE_SUBDIR)
    }

    pub fn catalogue_servers(&self) -> &[CatalogueServer] {
        &self.config.catalogue_servers
    }
}
