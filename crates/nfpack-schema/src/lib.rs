//! Descriptor model, package descriptor sections, and validation for nfpack.
//!
//! This crate defines the schema layer: YAML service and function descriptors
//! (`ServiceDescriptor`, `FunctionDescriptor`), the `FunctionId` join key,
//! single-descriptor location (`DescriptorFile`), the package descriptor
//! written as the archive manifest (`PackageDescriptor`), and the
//! `SchemaValidator` seam with its built-in structural implementation.

pub mod descriptor;
pub mod package;
pub mod types;
pub mod validate;

pub use descriptor::{
    locate_single_descriptor, parse_function_str, parse_service_str, typed_view, DeploymentUnit,
    DescriptorError, DescriptorFile, FunctionDescriptor, FunctionReference, ServiceDescriptor,
    CONTAINER_IMAGE_FORMAT, DEFAULT_IMAGE_FORMAT,
};
pub use package::{
    artifact_content_type, ArtifactDependency, Credentials, GeneralDescription,
    PackageContentEntry, PackageDependency, PackageDescriptor, PackageResolver,
    FUNCTION_DESCRIPTOR_CONTENT_TYPE, SERVICE_DESCRIPTOR_CONTENT_TYPE, UNFETCHED_ARTIFACT_DIGEST,
};
pub use types::{Digest, FunctionId};
pub use validate::{SchemaKind, SchemaValidator, StructuralValidator, ValidationError};
