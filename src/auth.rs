use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use tonic::metadata::MetadataMap;

use crate::error::{ClientError, Result};

pub const AUTHORIZATION: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";
const BASIC_PREFIX: &str = "Basic ";

/// `Basic base64(user:pass)`, as sent on the handshake call.
pub fn basic_authorization(username: &str, password: &str) -> String {
    let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
    format!("{BASIC_PREFIX}{encoded}")
}

pub fn bearer_authorization(token: &str) -> String {
    format!("{BEARER_PREFIX}{token}")
}

pub fn bearer_token_from_header(value: &str) -> Option<&str> {
    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Pull the session token out of a handshake response.
///
/// Servers answer basic auth with a bearer token in the `authorization`
/// response header; older ones put the raw token in the handshake payload.
pub fn token_from_handshake(headers: &MetadataMap, payload: &[u8]) -> Result<String> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| ClientError::Authentication("unreadable authorization header".into()))?;
        return bearer_token_from_header(value)
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::Authentication(format!("unexpected authorization header: {value}"))
            });
    }

    match std::str::from_utf8(payload) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Ok(_) => Err(ClientError::Authentication(
            "server returned no bearer token".into(),
        )),
        Err(_) => Err(ClientError::Authentication(
            "handshake payload is not a UTF-8 token".into(),
        )),
    }
}
