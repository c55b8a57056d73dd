//! Package assembly for nfpack.
//!
//! The [`Packager`] turns a project (one service descriptor plus function
//! descriptors and their local artifacts) into a package directory with a
//! `META-INF/MANIFEST.MF` package descriptor, then serializes that directory
//! into a single gzip-compressed tar archive. Function descriptors the
//! project does not ship are resolved through the workspace cache and the
//! configured catalogue servers. The [`Publisher`] uploads descriptors to
//! catalogue servers.

pub mod archive;
pub mod artifacts;
pub mod collector;
pub mod digest;
pub mod layout;
pub mod packager;
pub mod publish;
pub mod registry;
pub mod sources;

pub use archive::{read_archive, verify_archive, write_archive, ARCHIVE_EXTENSION};
pub use artifacts::{
    ArtifactOutcome, ArtifactProbe, ArtifactRef, ArtifactResolver, HttpProbe, PROBE_TIMEOUT,
};
pub use collector::{DescriptorCollector, LoadedFunction, LoadedService};
pub use digest::{bytes_digest, file_digest};
pub use layout::PackageLayout;
pub use packager::{PackageArtifact, Packager, PACKAGE_DESCRIPTOR_VERSION};
pub use publish::{ComponentKind, PublishFailure, PublishReport, Published, Publisher};
pub use registry::{DependencyRegistry, FunctionState};
pub use sources::{
    workspace_sources, CacheSource, CatalogueSource, DescriptorSource, Fetched, Resolution,
};

use nfpack_schema::{FunctionId, ValidationError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("workspace error: {0}")]
    Workspace(#[from] nfpack_workspace::WorkspaceError),
    #[error("descriptor error: {0}")]
    Descriptor(#[from] nfpack_schema::DescriptorError),
    #[error("catalogue error: {0}")]
    Catalogue(#[from] nfpack_catalogue::CatalogueError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("failed to walk package directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("destination directory '{}' is not empty", .0.display())]
    DestinationNotEmpty(PathBuf),
    #[error("unable to solve dependencies: {}", format_ids(.0))]
    UnresolvedDependencies(Vec<FunctionId>),
    #[error("please define {} in project.yml", .0.join(", "))]
    IncompleteProjectDescriptor(Vec<&'static str>),
    #[error("invalid package descriptor: {0}")]
    InvalidPackageDescriptor(#[source] ValidationError),
    #[error("missing package descriptor")]
    MissingPackageDescriptor,
    #[error("archive error: {0}")]
    Archive(String),
    #[error("no catalogue server is configured for publishing")]
    NoPublishTarget,
    #[error("'{}' is neither a service nor a function descriptor", .0.display())]
    UnknownComponent(PathBuf),
}

fn format_ids(ids: &[FunctionId]) -> String {
    ids.iter()
        .map(FunctionId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
