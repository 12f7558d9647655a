use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use products::ProductsError;
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry::TelemetryError;

mod config;
mod telemetry;

#[derive(Parser)]
#[command(version, about = "Product match lookup service")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve product match lookups over HTTP
    Products(ServiceArgs),
}

#[derive(Args)]
struct ServiceArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Products(#[from] ProductsError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("catalog: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        CliCommand::Products(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = telemetry::init_logging(&config.logging)?;
            if let Some(metrics) = &config.metrics {
                telemetry::init_metrics(metrics)?;
            }

            tracing::info!("Starting products service");
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(products::run(config.products))?;
        }
    }

    Ok(())
}
