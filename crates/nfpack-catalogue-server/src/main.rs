use clap::Parser;
use nfpack_catalogue_server::Store;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "nfpack-catalogue-server",
    about = "Reference catalogue server for service and function descriptors"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 4011)]
    port: u16,

    /// Directory to store descriptors in.
    #[arg(long, default_value = "./nfpack-catalogue-data")]
    data_dir: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = fs::create_dir_all(&cli.data_dir) {
        error!("failed to create data directory: {e}");
        return ExitCode::FAILURE;
    }

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting nfpack-catalogue-server on {addr}");
    info!("data directory: {}", cli.data_dir.display());

    let store = Arc::new(Store::new(cli.data_dir));
    match nfpack_catalogue_server::run_server(&store, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
