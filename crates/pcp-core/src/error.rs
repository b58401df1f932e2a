//! Command decoding errors

use thiserror::Error;

/// Errors raised while turning a raw command envelope into a typed [`Command`].
///
/// [`Command`]: crate::models::Command
#[derive(Debug, Error)]
pub enum CommandError {
    /// The `kind` field names no known handler.
    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    /// The payload does not match the schema of its kind.
    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CommandError {
    pub fn invalid_payload(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidPayload {
            kind: kind.into(),
            source,
        }
    }
}
