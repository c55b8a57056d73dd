//! Reference descriptor catalogue server.
//!
//! Serves the catalogue routes the nfpack client speaks:
//! `GET /` for liveness, `GET /{collection}[/id/{id}|/name/{name}]` and
//! `POST /{collection}`, where `collection` is `network-services` or `vnfs`.
//! Storage is file-backed: each descriptor lives at
//! `{data_dir}/{collection}/{vendor.name.version}.yml`.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use serde_yaml::Value;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    NetworkServices,
    Functions,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::NetworkServices => "network-services",
            Collection::Functions => "vnfs",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "network-services" => Some(Collection::NetworkServices),
            "vnfs" => Some(Collection::Functions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    All,
    Id(&'a str),
    Name(&'a str),
}

/// File-backed descriptor store.
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.as_str())
    }

    fn descriptor_path(&self, collection: Collection, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{id}.yml"))
    }

    /// Store a YAML descriptor and return its `vendor.name.version` id.
    /// Documents that are not a mapping with those three fields are
    /// rejected with [`io::ErrorKind::InvalidData`].
    pub fn put(&self, collection: Collection, yaml: &str) -> io::Result<String> {
        let value: Value = serde_yaml::from_str(yaml)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let id = descriptor_id(&value).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "descriptor needs vendor, name and version",
            )
        })?;
        if !is_valid_id(&id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid descriptor id '{id}'"),
            ));
        }
        fs::create_dir_all(self.collection_dir(collection))?;
        fs::write(self.descriptor_path(collection, &id), yaml)?;
        Ok(id)
    }

    pub fn get(&self, collection: Collection, id: &str) -> Option<String> {
        if !is_valid_id(id) {
            return None;
        }
        fs::read_to_string(self.descriptor_path(collection, id)).ok()
    }

    /// Every stored descriptor of a collection, ordered by id.
    pub fn list(&self, collection: Collection) -> Vec<Value> {
        let Ok(rd) = fs::read_dir(self.collection_dir(collection)) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = rd
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yml"))
            .collect();
        paths.sort();
        paths
            .iter()
            .filter_map(|p| fs::read_to_string(p).ok())
            .filter_map(|s| serde_yaml::from_str(&s).ok())
            .collect()
    }

    pub fn by_name(&self, collection: Collection, name: &str) -> Vec<Value> {
        self.list(collection)
            .into_iter()
            .filter(|v| v.get("name").and_then(scalar).as_deref() == Some(name))
            .collect()
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `vendor.name.version` of a descriptor mapping.
pub fn descriptor_id(value: &Value) -> Option<String> {
    let vendor = value.get("vendor").and_then(scalar)?;
    let name = value.get("name").and_then(scalar)?;
    let version = value.get("version").and_then(scalar)?;
    Some(format!("{vendor}.{name}.{version}"))
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.starts_with('.') && !id.contains('/') && !id.contains("..")
}

/// Parse a URL path into a collection and selector.
///
/// `/vnfs` → all, `/vnfs/id/{id}` → one descriptor, `/vnfs/name/{name}` → by name.
pub fn parse_route(path: &str) -> Option<(Collection, Selector<'_>)> {
    let path = path.split('?').next().unwrap_or(path);
    let rest = path.strip_prefix('/')?.trim_end_matches('/');
    let (head, tail) = match rest.split_once('/') {
        Some((head, tail)) => (head, Some(tail)),
        None => (rest, None),
    };
    let collection = Collection::parse(head)?;
    let selector = match tail {
        None => Selector::All,
        Some(tail) => match tail.split_once('/') {
            Some(("id", id)) if !id.is_empty() => Selector::Id(id),
            Some(("name", name)) if !name.is_empty() => Selector::Name(name),
            _ => return None,
        },
    };
    Some((collection, selector))
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_yaml(req: tiny_http::Request, body: String) {
    let mut response = Response::from_string(body);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/x-yaml") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

fn respond_list(req: tiny_http::Request, items: &[Value]) {
    match serde_yaml::to_string(items) {
        Ok(body) => respond_yaml(req, body),
        Err(e) => respond_err(req, 500, &format!("serialization error: {e}")),
    }
}

fn read_body(req: &mut tiny_http::Request) -> Option<String> {
    let mut body = String::new();
    if req.as_reader().read_to_string(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn handle_get(store: &Store, req: tiny_http::Request, collection: Collection, selector: Selector<'_>) {
    match selector {
        Selector::All => respond_list(req, &store.list(collection)),
        Selector::Name(name) => respond_list(req, &store.by_name(collection, name)),
        Selector::Id(id) => match store.get(collection, id) {
            Some(body) => respond_yaml(req, body),
            None => respond_err(req, 404, "not found"),
        },
    }
}

fn handle_post(store: &Store, mut req: tiny_http::Request, collection: Collection) {
    let Some(body) = read_body(&mut req) else {
        respond_err(req, 500, "read error");
        return;
    };
    match store.put(collection, &body) {
        Ok(id) => {
            info!("POST /{}: stored {id}", collection.as_str());
            let _ = req.respond(Response::from_string(id));
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            debug!("POST /{}: rejected: {e}", collection.as_str());
            respond_err(req, 400, &format!("invalid descriptor: {e}"));
        }
        Err(e) => {
            error!("POST /{}: {e}", collection.as_str());
            respond_err(req, 500, &format!("write error: {e}"));
        }
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(store: &Store, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    if url == "/" {
        if method == Method::Get {
            let _ = req.respond(Response::from_string("nfpack catalogue"));
        } else {
            respond_err(req, 405, "method not allowed");
        }
        return;
    }

    match (parse_route(&url), &method) {
        (Some((collection, selector)), Method::Get) => handle_get(store, req, collection, selector),
        (Some((collection, Selector::All)), Method::Post) => handle_post(store, req, collection),
        (Some(_), _) => respond_err(req, 405, "method not allowed"),
        (None, _) => respond_err(req, 404, "not found"),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(
    store: &Arc<Store>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(store, request);
    }
    Ok(())
}

/// A test helper that starts a catalogue server on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}` and stores descriptors in the provided `data_dir`.
/// Dropping the `TestServer` unblocks and stops the server.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server. Binds to `127.0.0.1:0` (random port).
    pub fn start(data_dir: PathBuf) -> Self {
        fs::create_dir_all(&data_dir).expect("failed to create test data dir");
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let store = Store::new(data_dir.clone());
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&store, request);
            }
        });

        Self {
            url,
            port,
            data_dir,
            server,
            handle: Some(handle),
        }
    }

    /// Seed a descriptor directly into the store, bypassing HTTP.
    pub fn seed(&self, collection: Collection, yaml: &str) -> String {
        Store::new(self.data_dir.clone())
            .put(collection, yaml)
            .expect("failed to seed descriptor")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
