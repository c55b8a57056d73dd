use crate::{CatalogueError, YAML_CONTENT_TYPE};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Timeout applied to every catalogue request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Descriptor collection exposed by a catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    NetworkServices,
    Functions,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::NetworkServices => "network-services",
            Resource::Functions => "vnfs",
        }
    }
}

/// Which descriptors a GET selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query<'a> {
    All,
    Id(&'a str),
    Name(&'a str),
}

/// Blocking catalogue client.
///
/// Routes:
/// - `GET  /`                              liveness, 200 when serving
/// - `GET  /network-services`              all service descriptors
/// - `GET  /network-services/id/<id>`      one service descriptor
/// - `GET  /network-services/name/<name>`  service descriptors by name
/// - `POST /network-services`              publish a service descriptor
/// - same for `/vnfs` with function descriptors
pub struct CatalogueClient {
    base_url: String,
    auth: Option<String>,
    agent: ureq::Agent,
}

impl CatalogueClient {
    /// Create a client for `base_url`, which must be an http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, CatalogueError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, CatalogueError> {
        let parsed =
            url::Url::parse(base_url).map_err(|_| CatalogueError::InvalidUrl(base_url.to_owned()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(CatalogueError::InvalidUrl(base_url.to_owned()));
        }
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth: None,
            agent,
        })
    }

    /// Send HTTP basic credentials with every request.
    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{username}:{password}"));
        self.auth = Some(format!("Basic {token}"));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: Resource, query: Query<'_>) -> String {
        match query {
            Query::All => format!("{}/{}", self.base_url, resource.path()),
            Query::Id(id) => format!("{}/{}/id/{id}", self.base_url, resource.path()),
            Query::Name(name) => format!("{}/{}/name/{name}", self.base_url, resource.path()),
        }
    }

    /// Whether the server answers `GET /` with 200. Connection errors and
    /// timeouts count as unavailable.
    pub fn alive(&self) -> bool {
        let url = format!("{}/", self.base_url);
        let mut req = self.agent.get(&url);
        if let Some(ref auth) = self.auth {
            req = req.header("Authorization", auth);
        }
        match req.call() {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(ureq::Error::StatusCode(code)) => {
                debug!("catalogue {url} answered HTTP {code}");
                false
            }
            Err(e) => {
                warn!("failed to contact catalogue '{url}': {e}");
                false
            }
        }
    }

    /// GET a descriptor collection. Any non-200 answer is `None`.
    pub fn get(&self, resource: Resource, query: Query<'_>) -> Result<Option<String>, CatalogueError> {
        let url = self.url(resource, query);
        debug!("GET {url}");
        let mut req = self.agent.get(&url);
        if let Some(ref auth) = self.auth {
            req = req.header("Authorization", auth);
        }
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                debug!("GET {url}: HTTP {code}");
                return Ok(None);
            }
            Err(e) => return Err(CatalogueError::Http(e.to_string())),
        };
        if resp.status().as_u16() != 200 {
            return Ok(None);
        }

        let mut reader = resp.into_body().into_reader();
        let mut body = String::new();
        reader
            .read_to_string(&mut body)
            .map_err(|e| CatalogueError::Http(e.to_string()))?;
        Ok(Some(body))
    }

    /// POST a YAML document to a collection.
    pub fn post(&self, resource: Resource, yaml: &str) -> Result<(), CatalogueError> {
        let url = self.url(resource, Query::All);
        debug!("POST {url} ({} bytes)", yaml.len());
        let mut req = self
            .agent
            .post(&url)
            .header("Content-Type", YAML_CONTENT_TYPE);
        if let Some(ref auth) = self.auth {
            req = req.header("Authorization", auth);
        }
        match req.send(yaml.as_bytes()) {
            Ok(resp) if resp.status().as_u16() == 200 => Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                error!("publishing to {url} failed: HTTP {status}");
                Err(CatalogueError::Rejected { status, url })
            }
            Err(ureq::Error::StatusCode(status)) => {
                error!("publishing to {url} failed: HTTP {status}");
                Err(CatalogueError::Rejected { status, url })
            }
            Err(e) => {
                error!("connection error to '{url}': {e}");
                Err(CatalogueError::Http(e.to_string()))
            }
        }
    }

    pub fn list_network_services(&self) -> Result<Option<String>, CatalogueError> {
        self.get(Resource::NetworkServices, Query::All)
    }

    pub fn network_services_by_name(&self, name: &str) -> Result<Option<String>, CatalogueError> {
        self.get(Resource::NetworkServices, Query::Name(name))
    }

    /// Fetch the service descriptor with the given `vendor.name.version` id.
    pub fn get_network_service(&self, id: &str) -> Result<Option<String>, CatalogueError> {
        let body = self.get(Resource::NetworkServices, Query::Id(id))?;
        single_descriptor(body, id)
    }

    pub fn post_network_service(&self, yaml: &str) -> Result<(), CatalogueError> {
        self.post(Resource::NetworkServices, yaml)
    }

    pub fn list_functions(&self) -> Result<Option<String>, CatalogueError> {
        self.get(Resource::Functions, Query::All)
    }

    pub fn functions_by_name(&self, name: &str) -> Result<Option<String>, CatalogueError> {
        self.get(Resource::Functions, Query::Name(name))
    }

    /// Fetch the function descriptor with the given `vendor.name.version` id.
    pub fn get_function(&self, id: &str) -> Result<Option<String>, CatalogueError> {
        let body = self.get(Resource::Functions, Query::Id(id))?;
        single_descriptor(body, id)
    }

    pub fn post_function(&self, yaml: &str) -> Result<(), CatalogueError> {
        self.post(Resource::Functions, yaml)
    }
}

/// Reduce an id-scoped response to exactly one descriptor document.
///
/// A one-element list is unwrapped, an empty body or list is `None`, and a
/// list with several elements is an error.
fn single_descriptor(body: Option<String>, id: &str) -> Result<Option<String>, CatalogueError> {
    let Some(body) = body else {
        return Ok(None);
    };
    let value: serde_yaml::Value =
        serde_yaml::from_str(&body).map_err(|e| CatalogueError::Serialization(e.to_string()))?;
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::Mapping(_) => Ok(Some(body)),
        serde_yaml::Value::Sequence(mut items) => match items.len() {
            0 => Ok(None),
            1 => {
                let item = items.remove(0);
                let text = serde_yaml::to_string(&item)
                    .map_err(|e| CatalogueError::Serialization(e.to_string()))?;
                Ok(Some(text))
            }
            _ => {
                error!("obtained multiple descriptors using id '{id}'");
                Err(CatalogueError::MultipleResults(id.to_owned()))
            }
        },
        _ => Err(CatalogueError::Serialization(format!(
            "descriptor for '{id}' is not a mapping"
        ))),
    }
}
