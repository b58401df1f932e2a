//! Inbound command envelope and typed commands

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ForwardRequest;
use crate::error::CommandError;

/// Raw inbound message as posted by the UI surface.
///
/// The payload stays unparsed until [`CommandMessage::command`] validates it
/// against the schema of its kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandMessage {
    /// Caller-generated correlation token
    #[serde(alias = "Id", alias = "ID")]
    pub id: String,
    /// Handler selector
    #[serde(alias = "Kind")]
    pub kind: String,
    /// Handler-specific payload
    #[serde(alias = "Payload")]
    pub payload: Value,
}

impl CommandMessage {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload,
        }
    }

    /// Decode a raw JSON text frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Validate the payload into the typed command selected by `kind`.
    pub fn command(&self) -> Result<Command, CommandError> {
        Command::from_parts(&self.kind, self.payload.clone())
    }
}

/// A validated command, one variant per handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Forward an HTTP request to the phone
    ApiFetch(ForwardRequest),
    /// Ask the operator to confirm a reboot
    ConfirmReboot,
    /// Toggle verbose log streaming
    SetVerbose(SetVerbose),
    /// Request a TLS policy change (acknowledged, policy stays pinned)
    SetTlsInsecure(SetTlsInsecure),
}

impl Command {
    pub const API_FETCH: &'static str = "apiFetch";
    pub const CONFIRM_REBOOT: &'static str = "confirmReboot";
    pub const SET_VERBOSE: &'static str = "setVerbose";
    pub const SET_TLS_INSECURE: &'static str = "setTlsInsecure";

    /// Build a typed command from its kind and raw payload.
    pub fn from_parts(kind: &str, payload: Value) -> Result<Self, CommandError> {
        match kind {
            Self::API_FETCH => serde_json::from_value(payload)
                .map(Command::ApiFetch)
                .map_err(|e| CommandError::invalid_payload(kind, e)),
            Self::CONFIRM_REBOOT => Ok(Command::ConfirmReboot),
            Self::SET_VERBOSE => serde_json::from_value(payload)
                .map(Command::SetVerbose)
                .map_err(|e| CommandError::invalid_payload(kind, e)),
            // The requested value never changes the policy, so an unreadable
            // payload is treated like an empty one.
            Self::SET_TLS_INSECURE => Ok(Command::SetTlsInsecure(
                serde_json::from_value(payload).unwrap_or_default(),
            )),
            other => Err(CommandError::UnknownKind(other.to_string())),
        }
    }

    /// Wire name of this command's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ApiFetch(_) => Self::API_FETCH,
            Command::ConfirmReboot => Self::CONFIRM_REBOOT,
            Command::SetVerbose(_) => Self::SET_VERBOSE,
            Command::SetTlsInsecure(_) => Self::SET_TLS_INSECURE,
        }
    }
}

/// Payload of `setVerbose`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVerbose {
    pub value: bool,
}

/// Payload of `setTlsInsecure`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTlsInsecure {
    #[serde(default)]
    pub value: Option<bool>,
}
