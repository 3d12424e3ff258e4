use std::process::ExitCode;

use flight_query_client::{Args, FlightConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse_resolved();
    init_tracing(args.debug);

    let config = match FlightConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid arguments");
            return ExitCode::FAILURE;
        }
    };

    match flight_query_client::run(&config).await {
        Ok(summary) => {
            info!(?summary, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
