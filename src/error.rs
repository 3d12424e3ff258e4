use std::path::PathBuf;

use arrow_flight::error::FlightError;
use arrow_schema::ArrowError;
use thiserror::Error;
use tonic::Status;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid endpoint {uri}: {source}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to read trusted certificates from {}: {source}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid request metadata: {0}")]
    InvalidMetadata(String),
    /// A Flight RPC failed; `op` names the step, the status is kept as-is.
    #[error("{op} failed: {status}")]
    Rpc {
        op: &'static str,
        #[source]
        status: Status,
    },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("session option {name} rejected: {reason}")]
    SessionOption { name: String, reason: String },
    #[error("flight info carries no endpoint ticket")]
    MissingTicket,
    #[error("record stream error: {0}")]
    Stream(#[from] FlightError),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn rpc(op: &'static str) -> impl FnOnce(Status) -> Self {
        move |status| ClientError::Rpc { op, status }
    }

    /// The gRPC status behind this error, when it came from the server.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Rpc { status, .. } => Some(status),
            _ => None,
        }
    }
}
