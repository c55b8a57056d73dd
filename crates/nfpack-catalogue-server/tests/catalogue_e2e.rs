//! Catalogue client ↔ server end-to-end tests.
//!
//! These tests start a real catalogue server in-process on a random port
//! and exercise the real `CatalogueClient` against it. No mocks.

use nfpack_catalogue::{CatalogueClient, CatalogueError};
use nfpack_catalogue_server::{Collection, TestServer};

const NSD: &str = "vendor: eu.example\nname: demo\nversion: '0.1'\nnetwork_functions: []\n";
const VNFD: &str = "vendor: eu.example\nname: firewall\nversion: '0.2'\n";

fn start_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(dir.path().to_path_buf());
    (server, dir)
}

fn name_of(yaml: &str) -> String {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
    value["name"].as_str().unwrap().to_owned()
}

#[test]
fn e2e_alive() {
    let (server, _dir) = start_server();
    let client = CatalogueClient::new(&server.url).unwrap();
    assert!(client.alive());
}

#[test]
fn e2e_post_then_get_function() {
    let (server, _dir) = start_server();
    let client = CatalogueClient::new(&server.url).unwrap();

    client.post_function(VNFD).unwrap();
    let body = client.get_function("eu.example.firewall.0.2").unwrap().unwrap();
    assert_eq!(name_of(&body), "firewall");
    assert!(server
        .data_dir
        .join("vnfs/eu.example.firewall.0.2.yml")
        .is_file());
}

#[test]
fn e2e_post_then_get_network_service() {
    let (server, _dir) = start_server();
    let client = CatalogueClient::new(&server.url).unwrap();

    client.post_network_service(NSD).unwrap();
    let body = client
        .get_network_service("eu.example.demo.0.1")
        .unwrap()
        .unwrap();
    assert_eq!(name_of(&body), "demo");
    assert!(client.get_function("eu.example.demo.0.1").unwrap().is_none());
}

#[test]
fn e2e_missing_function_is_none() {
    let (server, _dir) = start_server();
    let client = CatalogueClient::new(&server.url).unwrap();
    assert!(client.get_function("eu.example.absent.1.0").unwrap().is_none());
}

#[test]
fn e2e_list_and_by_name() {
    let (server, _dir) = start_server();
    server.seed(Collection::Functions, VNFD);
    server.seed(
        Collection::Functions,
        "vendor: eu.example\nname: firewall\nversion: '0.3'\n",
    );
    server.seed(
        Collection::Functions,
        "vendor: eu.example\nname: proxy\nversion: '1.0'\n",
    );
    let client = CatalogueClient::new(&server.url).unwrap();

    let all: Vec<serde_yaml::Value> =
        serde_yaml::from_str(&client.list_functions().unwrap().unwrap()).unwrap();
    assert_eq!(all.len(), 3);

    let firewalls: Vec<serde_yaml::Value> =
        serde_yaml::from_str(&client.functions_by_name("firewall").unwrap().unwrap()).unwrap();
    assert_eq!(firewalls.len(), 2);

    let services: Vec<serde_yaml::Value> =
        serde_yaml::from_str(&client.list_network_services().unwrap().unwrap()).unwrap();
    assert!(services.is_empty());
}

#[test]
fn e2e_post_invalid_descriptor_is_rejected() {
    let (server, _dir) = start_server();
    let client = CatalogueClient::new(&server.url).unwrap();
    let err = client.post_function("name: only-a-name\n").unwrap_err();
    assert!(matches!(err, CatalogueError::Rejected { status: 400, .. }));
}

#[test]
fn e2e_server_stops_on_drop() {
    let (server, _dir) = start_server();
    let url = server.url.clone();
    drop(server);
    let client = CatalogueClient::new(&url).unwrap();
    assert!(!client.alive());
}
