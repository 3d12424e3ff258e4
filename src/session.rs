//! Flight session-option messages and the actions that carry them.
//!
//! Sessions are driven through two Flight actions, `SetSessionOptions` and
//! `CloseSession`. Each action body is the protobuf-encoded request and each
//! result body the protobuf-encoded result, with field tags as in `Flight.proto`.

use std::collections::HashMap;

use crate::error::{ClientError, Result};

pub const SET_SESSION_OPTIONS: &str = "SetSessionOptions";
pub const CLOSE_SESSION: &str = "CloseSession";
pub const PROJECT_ID: &str = "project_id";

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionOptionValue {
    #[prost(oneof = "OptionValue", tags = "1, 2, 3, 4, 5")]
    pub option_value: Option<OptionValue>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum OptionValue {
    #[prost(string, tag = "1")]
    StringValue(String),
    #[prost(bool, tag = "2")]
    BoolValue(bool),
    #[prost(sfixed64, tag = "3")]
    Int64Value(i64),
    #[prost(double, tag = "4")]
    DoubleValue(f64),
    #[prost(message, tag = "5")]
    StringListValue(StringListValue),
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StringListValue {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

impl SessionOptionValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            option_value: Some(OptionValue::StringValue(value.into())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.option_value {
            Some(OptionValue::StringValue(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetSessionOptionsRequest {
    #[prost(map = "string, message", tag = "1")]
    pub session_options: HashMap<String, SessionOptionValue>,
}

impl SetSessionOptionsRequest {
    pub fn project(project_id: &str) -> Self {
        Self {
            session_options: HashMap::from([(
                PROJECT_ID.to_string(),
                SessionOptionValue::string(project_id),
            )]),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetSessionOptionsResult {
    #[prost(map = "string, message", tag = "1")]
    pub errors: HashMap<String, SessionOptionError>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct SessionOptionError {
    #[prost(enumeration = "SessionOptionErrorValue", tag = "1")]
    pub value: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SessionOptionErrorValue {
    Unspecified = 0,
    InvalidName = 1,
    InvalidValue = 2,
    Error = 3,
}

impl SetSessionOptionsResult {
    /// Fails on the first rejected option (by name, so the outcome is stable).
    pub fn into_result(self) -> Result<()> {
        let mut rejected: Vec<_> = self.errors.into_iter().collect();
        rejected.sort_by(|a, b| a.0.cmp(&b.0));
        match rejected.into_iter().next() {
            None => Ok(()),
            Some((name, error)) => Err(ClientError::SessionOption {
                name,
                reason: format!("{:?}", error.value()),
            }),
        }
    }
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct CloseSessionRequest {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct CloseSessionResult {
    #[prost(enumeration = "CloseSessionStatus", tag = "1")]
    pub status: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CloseSessionStatus {
    Unspecified = 0,
    Closed = 1,
    Closing = 2,
    NotCloseable = 3,
}
