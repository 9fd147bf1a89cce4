use cap_server::telemetry::{self, LogFormat};
use cap_server::{Config, ConfigLoader, Orchestrator};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cap", version, about = "Configurable HTTP stub server")]
struct Args {
    /// YAML configuration file, re-read while running
    #[arg(short, long, default_value = "cap.yml")]
    config: PathBuf,

    #[arg(
        short = 'l',
        long,
        default_value = "debug",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,

    #[arg(short = 'f', long, value_enum, default_value_t = LogFormat::Full)]
    log_format: LogFormat,

    /// Also append the application log to this file (repeatable)
    #[arg(short = 'o', long)]
    log_output: Vec<PathBuf>,

    /// Seconds between configuration file checks
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

fn check(path: &Path) -> anyhow::Result<()> {
    let bytes = ConfigLoader::new(path).load()?;
    let config = Config::from_slice(&bytes)?;
    info!(
        "Configuration '{}' is valid: {} servers, {} requests, {} responses",
        path.display(),
        config.servers.len(),
        config.requests.len(),
        config.responses.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init(&args.log_level, args.log_format, &args.log_output) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    if args.check {
        return match check(&args.config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    info!("cap v{} starting", env!("CARGO_PKG_VERSION"));
    let loader = ConfigLoader::with_interval(&args.config, Duration::from_secs(args.poll_interval));
    match Orchestrator::new(loader).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
