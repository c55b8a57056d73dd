use super::{json_pretty, EXIT_SUCCESS};
use clap::CommandFactory;
use nfpack_core::{PublishReport, Publisher};
use nfpack_workspace::{Project, Workspace};
use std::path::Path;

/// Publish either a whole project or a single descriptor file. Passing both
/// or neither prints the subcommand usage.
pub fn run<C: CommandFactory>(
    workspace_path: &Path,
    project: Option<&Path>,
    component: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    if project.is_some() == component.is_some() {
        let mut cmd = C::command();
        if let Some(sub) = cmd.find_subcommand_mut("publish") {
            sub.print_help().map_err(|e| e.to_string())?;
        }
        return Ok(EXIT_SUCCESS);
    }

    let workspace = Workspace::load(workspace_path).map_err(|e| e.to_string())?;
    let publisher = Publisher::from_workspace(&workspace).map_err(|e| e.to_string())?;

    let report = match (project, component) {
        (Some(dir), _) => {
            let project = Project::load(dir).map_err(|e| e.to_string())?;
            publisher.publish_project(&project)
        }
        (None, Some(file)) => publisher.publish_component(file),
        (None, None) => return Ok(EXIT_SUCCESS),
    }
    .map_err(|e| e.to_string())?;

    print_report(&report, json)?;
    if report.is_success() {
        Ok(EXIT_SUCCESS)
    } else {
        Err(format!(
            "failed to publish {} descriptor(s)",
            report.failed.len()
        ))
    }
}

fn print_report(report: &PublishReport, json: bool) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(report)?);
        return Ok(());
    }
    for p in &report.published {
        println!("published {} to {}", p.file, p.server);
    }
    for f in &report.failed {
        println!("failed {} on {}: {}", f.file, f.server, f.error);
    }
    Ok(())
}
