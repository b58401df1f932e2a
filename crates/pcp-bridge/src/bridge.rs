//! Message bridge: one correlated reply per command

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use pcp_client::{Forwarder, TLS_INSECURE};
use pcp_core::{Command, CommandMessage, Outbound, ReplyMessage, SetVerbose};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::confirm::Confirmer;
use crate::error::BridgeError;
use crate::logger::Verbosity;

pub const REBOOT_PROMPT: &str = "Send reboot command?";
pub const REBOOT_TITLE: &str = "Confirm Reboot";

/// Decodes commands from the UI surface and dispatches them by kind.
///
/// Every message produces exactly one [`ReplyMessage`]; failures of any
/// kind, panics included, are turned into error replies.
#[derive(Clone)]
pub struct MessageBridge {
    forwarder: Forwarder,
    confirmer: Arc<dyn Confirmer>,
    verbosity: Verbosity,
}

impl MessageBridge {
    pub fn new(forwarder: Forwarder, confirmer: Arc<dyn Confirmer>, verbosity: Verbosity) -> Self {
        Self {
            forwarder,
            confirmer,
            verbosity,
        }
    }

    pub fn verbosity(&self) -> &Verbosity {
        &self.verbosity
    }

    /// Handle one raw message and post its reply to `outbound`.
    pub async fn dispatch(&self, raw: &str, outbound: &dyn Outbound) {
        outbound.post(self.handle(raw).await);
    }

    /// Handle one raw message and return its reply.
    pub async fn handle(&self, raw: &str) -> ReplyMessage {
        let message = match CommandMessage::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                let err = BridgeError::Decode(e);
                warn!(error = %err, "Rejected message");
                return ReplyMessage::error("", err.to_string());
            }
        };

        match AssertUnwindSafe(self.execute(&message)).catch_unwind().await {
            Ok(Ok(data)) => ReplyMessage::data(message.id, data),
            Ok(Err(err)) => {
                warn!(id = %message.id, kind = %message.kind, error = %err, "Command failed");
                ReplyMessage::error(err.reply_to(&message.id), err.to_string())
            }
            Err(panic) => {
                let err = BridgeError::Panic(panic_message(panic.as_ref()));
                error!(id = %message.id, kind = %message.kind, error = %err, "Command handler panicked");
                ReplyMessage::error("", err.to_string())
            }
        }
    }

    #[instrument(skip(self, message), fields(id = %message.id, kind = %message.kind))]
    async fn execute(&self, message: &CommandMessage) -> Result<Value, BridgeError> {
        match message.command()? {
            Command::ApiFetch(request) => {
                let result = self.forwarder.forward(&request).await;
                serde_json::to_value(result).map_err(BridgeError::Serialize)
            }
            Command::ConfirmReboot => {
                let ok = self.confirmer.confirm(REBOOT_PROMPT, REBOOT_TITLE).await?;
                info!(ok, "Reboot confirmation answered");
                Ok(json!({ "ok": ok }))
            }
            Command::SetVerbose(SetVerbose { value }) => {
                self.verbosity.set(value);
                info!(verbose = value, "Verbose logging toggled");
                Ok(json!({ "ok": true, "verbose": self.verbosity.is_verbose() }))
            }
            Command::SetTlsInsecure(requested) => {
                if requested.value == Some(false) {
                    info!("Certificate validation stays disabled");
                }
                self.forwarder.clients().rebuild()?;
                Ok(json!({ "ok": true, "tlsInsecure": TLS_INSECURE }))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
