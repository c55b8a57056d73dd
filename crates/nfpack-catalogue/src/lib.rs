//! Client for descriptor catalogue servers.
//!
//! A catalogue stores network service descriptors and function descriptors
//! as YAML documents and exposes them over a small REST API. The packager
//! uses it to resolve function descriptors a project does not ship itself,
//! and `publish` uses it to upload descriptors.

pub mod client;

pub use client::{CatalogueClient, Query, Resource, DEFAULT_TIMEOUT};

use thiserror::Error;

/// Content type of every catalogue request body.
pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("invalid catalogue URL '{0}'")]
    InvalidUrl(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("catalogue rejected request: HTTP {status} for {url}")]
    Rejected { status: u16, url: String },
    #[error("catalogue returned multiple descriptors for id '{0}'")]
    MultipleResults(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
