//! Request and reply envelopes.
//!
//! Both envelopes travel as JSON objects:
//!
//! ```text
//! request: {"command": "select-row", "parameters": {...}}
//! reply:   {"status": "OK" | "FAIL", "message": "...", "parameters": {...}}
//! ```
//!
//! The request identity is never read from the payload. Transports attach it
//! from connection metadata with [`Request::with_identity`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

/// Envelope parameters: string keys to arbitrary JSON values.
pub type Parameters = Map<String, Value>;

/// Message used when a FAIL reply is built without one.
const UNSPECIFIED_FAILURE: &str = "request failed without a reason";

/// A parsed command request.
///
/// Fields are private so a request cannot change once it reaches a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    command: String,
    #[serde(default)]
    parameters: Parameters,
    #[serde(skip)]
    identity: Option<String>,
}

impl Request {
    /// Create a request for `command` with the given parameters.
    pub fn new(command: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            command: command.into(),
            parameters,
            identity: None,
        }
    }

    /// Create a request whose parameters are the fields of `value`.
    ///
    /// `value` must serialize to a JSON object.
    pub fn from_serializable<T: Serialize>(command: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(command, to_parameters(value)?))
    }

    /// Attach the identity supplied by the transport.
    pub fn with_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    /// Parse a request from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for invalid JSON or a missing
    /// command field, and [`ProtocolError::EmptyCommand`] for a blank command.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let request: Request =
            serde_json::from_slice(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if request.command.trim().is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        Ok(request)
    }

    /// Encode the request for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Identity attached by the transport, if any.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Decode the parameters into a typed value.
    pub fn decode_parameters<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.parameters)
    }
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
}

/// A reply to a [`Request`].
///
/// A FAIL reply always carries a non-empty message and no parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    status: Status,
    #[serde(default)]
    message: String,
    #[serde(default)]
    parameters: Parameters,
}

impl Reply {
    /// Successful reply carrying `parameters`.
    pub fn ok(parameters: Parameters) -> Self {
        Self {
            status: Status::Ok,
            message: String::new(),
            parameters,
        }
    }

    /// Failed reply. An empty message is replaced with a generic one.
    pub fn fail(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = UNSPECIFIED_FAILURE.to_string();
        }
        Self {
            status: Status::Fail,
            message,
            parameters: Parameters::new(),
        }
    }

    /// Successful reply whose parameters are the fields of `value`.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::ok(to_parameters(value)?))
    }

    /// Parse a reply from raw bytes.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let reply: Reply =
            serde_json::from_slice(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if reply.status == Status::Fail && reply.message.trim().is_empty() {
            return Err(ProtocolError::Malformed(
                "FAIL reply without a message".to_string(),
            ));
        }
        Ok(reply)
    }

    /// Encode the reply for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Decode the parameters into a typed value.
    pub fn decode_parameters<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.parameters)
    }
}

fn to_parameters<T: Serialize>(value: &T) -> Result<Parameters> {
    match serde_json::to_value(value).map_err(|e| ProtocolError::Encode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Parameters::new()),
        other => Err(ProtocolError::Encode(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
    }
}

fn decode<T: DeserializeOwned>(parameters: &Parameters) -> Result<T> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|e| ProtocolError::InvalidParameters(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
