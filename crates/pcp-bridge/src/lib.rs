//! pcp-bridge - Message bridge and local host surface for the PCP forwarder
//!
//! The UI surface talks to the forwarder with correlation-tagged JSON
//! messages. [`MessageBridge`] answers each of them exactly once,
//! [`RequestLogger`] persists every forward result and streams it while
//! verbose mode is on, and [`create_router`] exposes both over HTTP and a
//! WebSocket.
//!
//! # Usage
//!
//! ```ignore
//! use pcp_bridge::{create_router, HostState, MessageBridge, RequestLogger, Verbosity};
//!
//! let verbosity = Verbosity::default();
//! let logger = Arc::new(RequestLogger::new(default_log_path(), verbosity.clone()));
//! let forwarder = Forwarder::new(clients, logger.clone());
//! let bridge = MessageBridge::new(forwarder, Arc::new(ConsoleConfirmer::console()), verbosity);
//! let router = create_router(HostState::new(bridge, logger.stream(), "wwwroot"));
//! ```

pub mod bridge;
pub mod confirm;
pub mod error;
pub mod host;
pub mod logger;

pub use bridge::{MessageBridge, REBOOT_PROMPT, REBOOT_TITLE};
pub use confirm::{ConsoleConfirmer, Confirmer, FixedConfirmer, PromptConfirmer};
pub use error::{BridgeError, ConfirmError};
pub use host::{create_router, HostState, MISSING_INDEX_PAGE, NATIVE_JS};
pub use logger::{default_log_path, RequestLogger, Verbosity};
