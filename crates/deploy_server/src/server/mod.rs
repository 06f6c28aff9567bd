//! Network server: listener, accept loop and session registry.

mod core;
mod registry;

pub use self::core::TransferServer;
pub use registry::{SessionInfo, SessionRegistry};
