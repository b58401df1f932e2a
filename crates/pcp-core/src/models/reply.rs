//! Outbound reply messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation tag carried by log-stream events
pub const LOG_STREAM_TAG: &str = "__log__";

/// One outbound message: a success or error reply correlated by `replyTo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyMessage {
    Data {
        #[serde(rename = "replyTo")]
        reply_to: String,
        data: Value,
    },
    Error {
        #[serde(rename = "replyTo")]
        reply_to: String,
        error: String,
    },
}

impl ReplyMessage {
    pub fn data(reply_to: impl Into<String>, data: Value) -> Self {
        Self::Data {
            reply_to: reply_to.into(),
            data,
        }
    }

    pub fn error(reply_to: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            reply_to: reply_to.into(),
            error: error.into(),
        }
    }

    /// Log-stream event, not tied to any command.
    pub fn log(record: Value) -> Self {
        Self::data(LOG_STREAM_TAG, record)
    }

    pub fn reply_to(&self) -> &str {
        match self {
            Self::Data { reply_to, .. } | Self::Error { reply_to, .. } => reply_to,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Data { reply_to, .. } if reply_to == LOG_STREAM_TAG)
    }

    /// Serialize to the JSON text frame sent to the surface.
    pub fn to_json(&self) -> String {
        // Both variants hold only strings and JSON values.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"replyTo\":\"\",\"error\":{}}}",
                Value::String(e.to_string())
            )
        })
    }
}
