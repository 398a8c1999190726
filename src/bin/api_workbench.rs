//! API Workbench command line entry point.
//!
//! Executes one request spec read from a JSON file and prints the normalized
//! response as JSON on stdout. Logging goes to stderr and is controlled with
//! `RUST_LOG`.
//!
//! ```text
//! api-workbench <request.json> [--env NAME] [--store PATH] [--config PATH]
//! ```

use api_workbench::config::{load_config, load_config_file};
use api_workbench::{Dispatcher, ExecuteOptions, FileStorage, RequestSpec, VariableStore};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Execute a request spec and print the normalized response
#[derive(Debug, Parser)]
#[command(name = "api-workbench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Request spec as JSON
    #[arg(value_name = "REQUEST")]
    request: PathBuf,

    /// Environment to switch to before resolving variables
    #[arg(long, value_name = "NAME")]
    env: Option<String>,

    /// Variable store file (defaults to the user data directory)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Settings file with an `api-workbench` section
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => load_config(None)?,
    };

    let store_path = match args.store {
        Some(path) => path,
        None => FileStorage::default_path()?,
    };
    log::debug!("Using store {}", store_path.display());
    let store = VariableStore::new(Arc::new(FileStorage::new(store_path)));

    if let Some(environment) = &args.env {
        store.set_current_environment(environment)?;
    }

    let spec: RequestSpec = serde_json::from_str(&std::fs::read_to_string(&args.request)?)?;

    let dispatcher = Dispatcher::builder()
        .config(config)
        .variable_store(store)
        .build()?;

    let validation = dispatcher
        .request_builder()
        .resolver()
        .validate(&spec.url);
    if !validation.is_valid {
        log::warn!("Unresolved variables in URL: {}", validation.missing.join(", "));
    }

    let response = dispatcher.execute(&spec, ExecuteOptions::default()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    tokio::select! {
        result = run(args) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            ExitCode::from(130)
        }
    }
}
