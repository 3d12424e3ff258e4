use tonic::Request;
use tonic::metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue};

use crate::auth::{
    AUTHORIZATION, basic_authorization, bearer_authorization, bearer_token_from_header,
};
use crate::error::{ClientError, Result};

/// Workload-management headers attached to every call.
pub const ROUTING_TAG: (&str, &str) = ("routing-tag", "test-routing-tag");
pub const ROUTING_QUEUE: (&str, &str) = ("routing-queue", "Low Cost User Queries");
pub const ROUTING_ENGINE: &str = "routing_engine";

/// Request-scoped metadata carried onto every Flight call of a run.
///
/// Starts out holding routing headers and client properties; after
/// authentication it also holds the bearer credential.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: MetadataMap,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routing() -> Self {
        let mut metadata = MetadataMap::new();
        metadata.insert(
            MetadataKey::from_static(ROUTING_TAG.0),
            MetadataValue::from_static(ROUTING_TAG.1),
        );
        metadata.insert(
            MetadataKey::from_static(ROUTING_QUEUE.0),
            MetadataValue::from_static(ROUTING_QUEUE.1),
        );
        Self { metadata }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self> {
        let (key, value) = parse_pair(key, value)?;
        self.metadata.append(key, value);
        Ok(self)
    }

    /// Authorization for the basic-auth handshake, replacing any existing one.
    pub fn with_basic(mut self, username: &str, password: &str) -> Result<Self> {
        let value = basic_authorization(username, password)
            .parse::<MetadataValue<Ascii>>()
            .map_err(|_| {
                ClientError::InvalidMetadata("credentials are not a valid header value".into())
            })?;
        self.metadata.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Replaces any existing authorization with `Bearer <token>`.
    pub fn with_bearer(mut self, token: &str) -> Result<Self> {
        let value = bearer_authorization(token)
            .parse::<MetadataValue<Ascii>>()
            .map_err(|_| ClientError::InvalidMetadata("token is not a valid header value".into()))?;
        self.metadata.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn bearer(&self) -> Option<&str> {
        self.get(AUTHORIZATION).and_then(bearer_token_from_header)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn request<T>(&self, message: T) -> Request<T> {
        let mut req = Request::new(message);
        self.apply(&mut req);
        req
    }

    pub fn apply<T>(&self, req: &mut Request<T>) {
        let target = req.metadata_mut();
        for entry in self.metadata.iter() {
            match entry {
                KeyAndValueRef::Ascii(key, value) => {
                    target.append(key.clone(), value.clone());
                }
                KeyAndValueRef::Binary(key, value) => {
                    target.append_bin(key.clone(), value.clone());
                }
            }
        }
    }
}

fn parse_pair(key: &str, value: &str) -> Result<(MetadataKey<Ascii>, MetadataValue<Ascii>)> {
    let parsed_key = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
        .map_err(|_| ClientError::InvalidMetadata(format!("invalid header name `{key}`")))?;
    let parsed_value = value
        .parse::<MetadataValue<Ascii>>()
        .map_err(|_| ClientError::InvalidMetadata(format!("invalid value for header `{key}`")))?;
    Ok((parsed_key, parsed_value))
}
