//! Error types for the message bridge

use pcp_client::ClientError;
use pcp_core::CommandError;
use thiserror::Error;

/// Errors raised while handling one command message
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Frame is not a JSON command envelope
    #[error("Invalid message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Unknown kind or malformed payload
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Reply data could not be serialized
    #[error("Failed to serialize reply: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The confirmation collaborator failed
    #[error("Confirmation failed: {0}")]
    Confirm(#[from] ConfirmError),

    /// Replacement HTTP client could not be built
    #[error("Failed to rebuild HTTP client: {0}")]
    Rebuild(#[from] ClientError),

    /// A handler panicked
    #[error("Handler panicked: {0}")]
    Panic(String),
}

impl BridgeError {
    /// Correlation id of the error reply for command `id`.
    ///
    /// Only an unknown kind is answered under the command's own id; every
    /// other failure is a bridge-level fault answered under `""`.
    pub fn reply_to<'a>(&self, id: &'a str) -> &'a str {
        match self {
            BridgeError::Command(CommandError::UnknownKind(_)) => id,
            _ => "",
        }
    }
}

/// Errors of a [`Confirmer`](crate::Confirmer)
#[derive(Error, Debug)]
pub enum ConfirmError {
    #[error("Console input closed")]
    Closed,

    #[error("Console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
