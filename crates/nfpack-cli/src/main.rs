mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_DESCRIPTOR_ERROR, EXIT_FAILURE, EXIT_UNRESOLVED};
use nfpack_workspace::{Workspace, DEFAULT_WORKSPACE_DIR};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "nfpack",
    version,
    about = "Package builder for network service and function descriptors"
)]
struct Cli {
    /// Path to the nfpack workspace directory.
    #[arg(long, default_value = DEFAULT_WORKSPACE_DIR, global = true)]
    workspace: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a package archive from a project.
    Pack {
        /// Project directory containing project.yml.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Directory for the package tree and archive (must be empty).
        #[arg(short, long)]
        destination: Option<PathBuf>,
        /// Archive name, defaults to <vendor>.<name>.<version>.
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Publish descriptors to the catalogue servers marked for publishing.
    Publish {
        /// Publish every descriptor of a project.
        #[arg(long)]
        project: Option<PathBuf>,
        /// Publish a single descriptor file.
        #[arg(long)]
        component: Option<PathBuf>,
    },
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let workspace_path = expand_tilde(&cli.workspace);

    let default_level = if cli.trace {
        "trace".to_owned()
    } else if cli.verbose {
        "debug".to_owned()
    } else {
        configured_log_level(&workspace_path).unwrap_or_else(|| "warn".to_owned())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("NFPACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Pack {
            project,
            destination,
            name,
        } => load_workspace(&workspace_path).and_then(|ws| {
            commands::pack::run(
                &ws,
                &project,
                destination.as_deref(),
                name.as_deref(),
                json_output,
            )
        }),
        Commands::Publish { project, component } => {
            commands::publish::run::<Cli>(
                &workspace_path,
                project.as_deref(),
                component.as_deref(),
                json_output,
            )
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("descriptor error:") {
                EXIT_DESCRIPTOR_ERROR
            } else if msg.starts_with("unable to solve dependencies") {
                EXIT_UNRESOLVED
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn load_workspace(path: &Path) -> Result<Workspace, String> {
    Workspace::load(path).map_err(|e| e.to_string())
}

/// `log_level` from the workspace descriptor, if the workspace loads.
fn configured_log_level(path: &Path) -> Option<String> {
    Workspace::load(path)
        .ok()
        .and_then(|ws| ws.config().log_level.clone())
        .map(|level| level.to_lowercase())
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
