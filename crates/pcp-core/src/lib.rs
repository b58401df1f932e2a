//! pcp-core - Core types for the PCP desk-phone forwarder
//!
//! This crate holds the wire model shared by the forwarding engine and the
//! message bridge: correlation-tagged commands and replies, forward
//! requests/results, and the seams (`ResultRecorder`, `Outbound`) through
//! which the engine and bridge publish their side effects.

pub mod error;
pub mod models;
pub mod outbound;
pub mod recorder;

pub use error::CommandError;
pub use models::*;
pub use outbound::Outbound;
pub use recorder::{NoopRecorder, ResultRecorder};
