pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod output;
pub mod runner;
pub mod session;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_server;

use tracing::info;

pub use client::GrpcFlightClient;
pub use config::{Args, Credentials, FlightConfig, TlsMode};
pub use connection::ConnectionBuilder;
pub use context::CallContext;
pub use error::{ClientError, Result};
pub use output::{OutputFormat, QueryStats};
pub use runner::run_with_client;
pub use types::{BatchStream, FlightClient, RunSummary};

/// Connects to the configured endpoint and runs against it, printing to stdout.
pub async fn run(config: &FlightConfig) -> Result<RunSummary> {
    config.validate()?;
    info!(host = %config.host, port = config.port, "connecting");
    let channel = ConnectionBuilder::from_config(config).connect().await?;
    let mut client = GrpcFlightClient::new(channel);
    run_with_client(config, &mut client, std::io::stdout()).await
}
