use std::time::Duration;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::info;

use crate::config::{FlightConfig, TlsMode};
use crate::error::{ClientError, Result};

/// Configurable builder for the gRPC channel to a Flight endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    uri: String,
    domain_name: Option<String>,
    tls: TlsMode,
    connect_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            domain_name: None,
            tls: TlsMode::Disabled,
            connect_timeout: None,
        }
    }

    pub fn from_config(config: &FlightConfig) -> Self {
        let mut builder = Self::new(config.endpoint_uri())
            .with_tls(config.tls.clone())
            .with_domain_name(config.host.clone());
        if let Some(timeout) = config.connect_timeout {
            builder = builder.with_connect_timeout(timeout);
        }
        builder
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Name the server certificate must be issued for.
    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = Some(domain_name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub async fn connect(&self) -> Result<Channel> {
        let mut endpoint = Endpoint::from_shared(self.uri.clone()).map_err(|source| {
            ClientError::InvalidEndpoint {
                uri: self.uri.clone(),
                source,
            }
        })?;
        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        if let Some(tls) = self.tls_config().await? {
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|source| ClientError::InvalidEndpoint {
                    uri: self.uri.clone(),
                    source,
                })?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|source| ClientError::Connect {
                uri: self.uri.clone(),
                source,
            })?;
        info!(uri = %self.uri, tls = self.tls.is_enabled(), "connected to flight endpoint");
        Ok(channel)
    }

    async fn tls_config(&self) -> Result<Option<ClientTlsConfig>> {
        let TlsMode::Enabled { certs } = &self.tls else {
            return Ok(None);
        };
        info!("enabling TLS connection");

        let mut tls = ClientTlsConfig::new();
        if let Some(domain) = &self.domain_name {
            tls = tls.domain_name(domain.clone());
        }
        let tls = match certs {
            Some(path) => {
                info!(path = %path.display(), "using trusted certificates");
                let pem =
                    tokio::fs::read(path)
                        .await
                        .map_err(|source| ClientError::Certificate {
                            path: path.clone(),
                            source,
                        })?;
                tls.ca_certificate(Certificate::from_pem(pem))
            }
            None => {
                info!("using default host root certificates");
                tls.with_native_roots()
            }
        };
        Ok(Some(tls))
    }
}
