//! Fallback chain for function descriptors the project does not ship.
//!
//! Sources are tried in order for each unresolved FunctionId: the workspace
//! cache first, then one catalogue server after another. The first source
//! that can provide the descriptor wins.

use crate::PackageError;
use nfpack_catalogue::CatalogueClient;
use nfpack_schema::{Credentials, FunctionId, PackageResolver, SchemaKind, SchemaValidator};
use nfpack_workspace::{DescriptorCache, Workspace};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The descriptor is already in the workspace cache.
    Cached,
    /// The descriptor text was downloaded from the catalogue at `origin`.
    Remote { descriptor: String, origin: String },
}

pub trait DescriptorSource {
    /// Human-readable name used in log messages.
    fn name(&self) -> String;

    fn try_fetch(&self, id: &FunctionId) -> Option<Fetched>;
}

pub struct CacheSource {
    cache: Rc<dyn DescriptorCache>,
}

impl CacheSource {
    pub fn new(cache: Rc<dyn DescriptorCache>) -> Self {
        Self { cache }
    }
}

impl DescriptorSource for CacheSource {
    fn name(&self) -> String {
        "workspace cache".to_owned()
    }

    fn try_fetch(&self, id: &FunctionId) -> Option<Fetched> {
        self.cache.contains(id).then_some(Fetched::Cached)
    }
}

pub struct CatalogueSource {
    client: CatalogueClient,
}

impl CatalogueSource {
    pub fn new(client: CatalogueClient) -> Self {
        Self { client }
    }
}

impl DescriptorSource for CatalogueSource {
    fn name(&self) -> String {
        format!("catalogue {}", self.client.base_url())
    }

    fn try_fetch(&self, id: &FunctionId) -> Option<Fetched> {
        if !self.client.alive() {
            warn!(
                "catalogue server '{}' is not responding, skipping",
                self.client.base_url()
            );
            return None;
        }
        match self.client.get_function(id.as_str()) {
            Ok(Some(descriptor)) if !descriptor.trim().is_empty() => Some(Fetched::Remote {
                descriptor,
                origin: self.client.base_url().to_owned(),
            }),
            Ok(_) => {
                debug!("{id} not found in catalogue {}", self.client.base_url());
                None
            }
            Err(e) => {
                warn!(
                    "failed to fetch {id} from catalogue {}: {e}",
                    self.client.base_url()
                );
                None
            }
        }
    }
}

/// Build the default chain for a workspace: the cache, then every
/// configured catalogue server in configuration order.
pub fn workspace_sources(
    workspace: &Workspace,
    cache: &Rc<dyn DescriptorCache>,
) -> Vec<Box<dyn DescriptorSource>> {
    let mut sources: Vec<Box<dyn DescriptorSource>> =
        vec![Box::new(CacheSource::new(Rc::clone(cache)))];
    for server in workspace.catalogue_servers() {
        match CatalogueClient::new(&server.url) {
            Ok(client) => {
                let client = match (&server.username, &server.password) {
                    (Some(user), Some(password)) => client.with_credentials(user, password),
                    _ => client,
                };
                sources.push(Box::new(CatalogueSource::new(client)));
            }
            Err(e) => warn!("ignoring catalogue server '{}': {e}", server.id),
        }
    }
    if sources.len() == 1 {
        warn!("there are no catalogue servers configured");
    }
    sources
}

/// Outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Ids now available in the cache, in the order they were attempted.
    pub resolved: Vec<FunctionId>,
    pub unresolved: Vec<FunctionId>,
    /// Catalogue servers that provided at least one descriptor, deduplicated.
    pub resolvers: Vec<PackageResolver>,
}

/// Try every id against the chain, storing downloaded descriptors in the
/// cache as `<descriptor name>.<extension>`. A downloaded descriptor that
/// fails validation is never cached and the next source is tried.
pub fn resolve(
    ids: &[FunctionId],
    sources: &[Box<dyn DescriptorSource>],
    cache: &dyn DescriptorCache,
    validator: &dyn SchemaValidator,
    extension: &str,
) -> Result<Resolution, PackageError> {
    let mut resolution = Resolution::default();
    'ids: for id in ids {
        for source in sources {
            match source.try_fetch(id) {
                None => continue,
                Some(Fetched::Cached) => {
                    debug!("{id} found in {}", source.name());
                }
                Some(Fetched::Remote { descriptor, origin }) => {
                    if let Err(reason) = check_remote(&descriptor, validator) {
                        warn!("ignoring {id} from {origin}: {reason}");
                        continue;
                    }
                    let file_name = format!("{}.{extension}", descriptor_name(&descriptor, id));
                    cache.store(id, &file_name, &descriptor)?;
                    info!("fetched {id} from {origin}");
                    if !resolution.resolvers.iter().any(|r| r.name == origin) {
                        resolution.resolvers.push(PackageResolver {
                            name: origin,
                            credentials: Credentials::default(),
                        });
                    }
                }
            }
            resolution.resolved.push(id.clone());
            continue 'ids;
        }
        warn!("no source could provide {id}");
        resolution.unresolved.push(id.clone());
    }
    Ok(resolution)
}

fn check_remote(descriptor: &str, validator: &dyn SchemaValidator) -> Result<(), String> {
    let value: serde_yaml::Value = serde_yaml::from_str(descriptor).map_err(|e| e.to_string())?;
    validator
        .validate(SchemaKind::FunctionDescriptor, &value)
        .map_err(|e| e.to_string())
}

/// The `name` field of a descriptor document, falling back to the id.
fn descriptor_name(descriptor: &str, id: &FunctionId) -> String {
    serde_yaml::from_str::<serde_yaml::Value>(descriptor)
        .ok()
        .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_owned))
        .filter(|n| !n.is_empty() && !n.contains('/'))
        .unwrap_or_else(|| id.to_string())
}
