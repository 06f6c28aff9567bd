//! Per-connection session state and the filesystem operations a session may
//! perform.
//!
//! A [`Session`] is owned by exactly one connection task. The shared
//! [`SessionDriver`] holds nothing mutable per session, so many connection
//! tasks can use it concurrently.

mod driver;
pub mod path;

pub use driver::{DirEntry, EntryKind, SessionDriver};

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Unique identifier for one control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { identity: String },
    /// Terminal; every operation fails afterwards
    Closed,
}

/// One client connection.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    remote_addr: SocketAddr,
    state: SessionState,
    cwd: String,
    connected_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            remote_addr,
            state: SessionState::Unauthenticated,
            cwd: "/".to_string(),
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The authenticated identity, if logged in.
    pub fn identity(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { identity } => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Current working directory as an absolute virtual path.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}
