//! Workspace and project configuration for nfpack.
//!
//! A workspace holds the user's catalogue server list, descriptor file
//! extension, schema locations, and the cache of previously resolved function
//! descriptors. A project is the source tree a package is built from.

pub mod cache;
pub mod project;
pub mod workspace;

pub use cache::{DescriptorCache, FsDescriptorCache, MemoryDescriptorCache};
pub use project::{Project, ProjectConfig, PROJECT_DESCRIPTOR};
pub use workspace::{
    CatalogueServer, Workspace, WorkspaceConfig, DEFAULT_WORKSPACE_DIR, WORKSPACE_DESCRIPTOR,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("'{}' is not a valid workspace directory", .0.display())]
    InvalidWorkspace(PathBuf),
    #[error("'{}' is not a valid project directory", .0.display())]
    InvalidProject(PathBuf),
    #[error(transparent)]
    Descriptor(#[from] nfpack_schema::DescriptorError),
}
