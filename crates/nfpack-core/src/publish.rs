//! Uploads descriptors to the catalogue servers marked for publishing.

use crate::PackageError;
use nfpack_catalogue::CatalogueClient;
use nfpack_schema::{DescriptorError, DescriptorFile};
use nfpack_workspace::{Project, Workspace};
use serde::Serialize;
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    ServiceDescriptor,
    FunctionDescriptor,
}

impl ComponentKind {
    /// Classify a descriptor document by its content.
    pub fn classify(value: &Value) -> Option<Self> {
        let map = value.as_mapping()?;
        let has = |key: &str| map.contains_key(key);
        if has("network_functions") {
            Some(ComponentKind::ServiceDescriptor)
        } else if has("virtual_deployment_units") || (has("vendor") && has("name") && has("version"))
        {
            Some(ComponentKind::FunctionDescriptor)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub server: String,
    pub file: String,
    pub kind: ComponentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishFailure {
    pub server: String,
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: Vec<Published>,
    pub failed: Vec<PublishFailure>,
}

impl PublishReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Publisher {
    targets: Vec<(String, CatalogueClient)>,
    extension: String,
}

impl Publisher {
    /// `targets` pairs a server id with its client.
    pub fn new(targets: Vec<(String, CatalogueClient)>, extension: &str) -> Result<Self, PackageError> {
        if targets.is_empty() {
            return Err(PackageError::NoPublishTarget);
        }
        Ok(Self {
            targets,
            extension: extension.to_owned(),
        })
    }

    /// Every workspace catalogue server with `publish: true`.
    pub fn from_workspace(workspace: &Workspace) -> Result<Self, PackageError> {
        let mut targets = Vec::new();
        for server in workspace.catalogue_servers().iter().filter(|s| s.publish) {
            match CatalogueClient::new(&server.url) {
                Ok(client) => {
                    let client = match (&server.username, &server.password) {
                        (Some(user), Some(password)) => client.with_credentials(user, password),
                        _ => client,
                    };
                    targets.push((server.id.clone(), client));
                }
                Err(e) => warn!("ignoring catalogue server '{}': {e}", server.id),
            }
        }
        Self::new(targets, workspace.descriptor_extension())
    }

    /// Publish one descriptor file, classified by its content.
    pub fn publish_component(&self, path: &Path) -> Result<PublishReport, PackageError> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_yaml::from_str(&content)?;
        let kind = ComponentKind::classify(&value)
            .ok_or_else(|| PackageError::UnknownComponent(path.to_path_buf()))?;
        let mut report = PublishReport::default();
        self.post(&mut report, &path.display().to_string(), kind, &content);
        Ok(report)
    }

    /// Publish the project's service descriptor and every function
    /// descriptor under `sources/vnf`.
    pub fn publish_project(&self, project: &Project) -> Result<PublishReport, PackageError> {
        let mut report = PublishReport::default();
        let service = DescriptorFile::locate(&project.service_dir(), &self.extension)?;
        self.post(
            &mut report,
            &service.display_path(),
            ComponentKind::ServiceDescriptor,
            &service.content,
        );

        for dir in project.function_dirs()? {
            let file = match DescriptorFile::locate(&dir, &self.extension) {
                Ok(file) => file,
                Err(
                    e @ (DescriptorError::MissingFile { .. } | DescriptorError::MultipleFiles { .. }),
                ) => {
                    warn!("skipping function directory {}: {e}", dir.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.post(
                &mut report,
                &file.display_path(),
                ComponentKind::FunctionDescriptor,
                &file.content,
            );
        }
        Ok(report)
    }

    fn post(&self, report: &mut PublishReport, file: &str, kind: ComponentKind, content: &str) {
        for (server, client) in &self.targets {
            let result = match kind {
                ComponentKind::ServiceDescriptor => client.post_network_service(content),
                ComponentKind::FunctionDescriptor => client.post_function(content),
            };
            match result {
                Ok(()) => {
                    info!("published {file} to {server}");
                    report.published.push(Published {
                        server: server.clone(),
                        file: file.to_owned(),
                        kind,
                    });
                }
                Err(e) => {
                    error!("failed to publish {file} to {server}: {e}");
                    report.failed.push(PublishFailure {
                        server: server.clone(),
                        file: file.to_owned(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfpack_workspace::{CatalogueServer, WorkspaceConfig};

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn classify_by_content() {
        assert_eq!(
            ComponentKind::classify(&yaml("name: s\nnetwork_functions: []\n")),
            Some(ComponentKind::ServiceDescriptor)
        );
        assert_eq!(
            ComponentKind::classify(&yaml("name: f\nvirtual_deployment_units: []\n")),
            Some(ComponentKind::FunctionDescriptor)
        );
        assert_eq!(
            ComponentKind::classify(&yaml("vendor: v\nname: f\nversion: '1'\n")),
            Some(ComponentKind::FunctionDescriptor)
        );
        assert_eq!(ComponentKind::classify(&yaml("name: x\n")), None);
        assert_eq!(ComponentKind::classify(&yaml("- a\n")), None);
    }

    #[test]
    fn no_publishing_server_is_an_error() {
        let mut config = WorkspaceConfig::new("test");
        config
            .catalogue_servers
            .push(CatalogueServer::new("cat", "http://127.0.0.1:4011"));
        let workspace = Workspace::new("/ws", config);
        assert!(matches!(
            Publisher::from_workspace(&workspace),
            Err(PackageError::NoPublishTarget)
        ));
    }

    #[test]
    fn publishing_servers_selected() {
        let mut config = WorkspaceConfig::new("test");
        config
            .catalogue_servers
            .push(CatalogueServer::new("a", "http://127.0.0.1:4011"));
        config
            .catalogue_servers
            .push(CatalogueServer::new("b", "http://127.0.0.1:4012").publishing());
        let workspace = Workspace::new("/ws", config);
        let publisher = Publisher::from_workspace(&workspace).unwrap();
        assert_eq!(publisher.targets.len(), 1);
        assert_eq!(publisher.targets[0].0, "b");
    }

    #[test]
    fn unknown_component_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thing.yml");
        fs::write(&path, "hello: world\n").unwrap();
        let client = CatalogueClient::new("http://127.0.0.1:1").unwrap();
        let publisher = Publisher::new(vec![("x".to_owned(), client)], "yml").unwrap();
        assert!(matches!(
            publisher.publish_component(&path),
            Err(PackageError::UnknownComponent(_))
        ));
    }

    #[test]
    fn unreachable_server_is_reported_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vnfd.yml");
        fs::write(&path, "vendor: v\nname: f\nversion: '1'\n").unwrap();
        let client = CatalogueClient::new("http://127.0.0.1:1").unwrap();
        let publisher = Publisher::new(vec![("x".to_owned(), client)], "yml").unwrap();
        let report = publisher.publish_component(&path).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert!(report.published.is_empty());
    }
}
