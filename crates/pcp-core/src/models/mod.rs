//! Wire models for the bridge protocol and the forwarding engine

mod command;
mod forward;
mod reply;

pub use command::*;
pub use forward::*;
pub use reply::*;
