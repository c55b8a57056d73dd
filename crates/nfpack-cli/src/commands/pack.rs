use super::{colorize_sealed, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use nfpack_core::Packager;
use nfpack_workspace::{Project, Workspace};
use std::path::Path;

pub fn run(
    workspace: &Workspace,
    project_dir: &Path,
    destination: Option<&Path>,
    name: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let project = Project::load(project_dir).map_err(|e| e.to_string())?;
    let mut packager =
        Packager::new(workspace, project, destination).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("packaging project..."))
    };
    let artifact = match packager.package(name) {
        Ok(a) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "package created");
            }
            a
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "packaging failed");
            }
            return Err(e.to_string());
        }
    };

    let descriptor = packager
        .descriptor()
        .ok_or_else(|| "missing package descriptor".to_owned())?;
    if json {
        let payload = serde_json::json!({
            "package": artifact.path,
            "digest": artifact.digest,
            "name": descriptor.package_name(),
            "sealed": descriptor.general.sealed,
            "content": descriptor.package_content.len(),
            "functions": packager.registry().len(),
            "resolvers": descriptor
                .package_resolvers
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            "artifact_dependencies": descriptor
                .artifact_dependencies
                .iter()
                .map(|a| a.url.as_str())
                .collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "package {} ({})",
            descriptor.package_name(),
            colorize_sealed(descriptor.general.sealed)
        );
        println!("path: {}", artifact.path.display());
        println!("digest: {}", artifact.digest);
        for dep in &descriptor.artifact_dependencies {
            println!("external artifact: {} {}", dep.name, dep.url);
        }
    }
    Ok(EXIT_SUCCESS)
}
