//! Live session bookkeeping.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// What the server knows about one connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    /// Set once the client has logged in
    pub identity: Option<String>,
}

/// Tracks every open control connection.
///
/// Sessions themselves are owned by their connection tasks; the registry
/// only mirrors enough to enforce the connection limit and report who is
/// connected. Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: SessionId, remote_addr: SocketAddr, connected_at: DateTime<Utc>) {
        self.sessions.insert(
            id,
            SessionInfo {
                remote_addr,
                connected_at,
                identity: None,
            },
        );
    }

    /// Records the identity a session logged in with.
    ///
    /// Returns `false` if the session is not registered.
    pub fn set_identity(&self, id: SessionId, identity: &str) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut info) => {
                info.identity = Some(identity.to_string());
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.remove(&id).map(|(_, info)| info)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.get(&id).map(|info| info.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn authenticated_count(&self) -> usize {
        self.sessions.iter().filter(|entry| entry.identity.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let registry = SessionRegistry::new();
        let id = SessionId::new();
        let addr: SocketAddr = "10.0.0.2:51000".parse().unwrap();

        registry.register(id, addr, Utc::now());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.authenticated_count(), 0);

        assert!(registry.set_identity(id, "admin"));
        assert_eq!(registry.get(id).unwrap().identity.as_deref(), Some("admin"));
        assert_eq!(registry.authenticated_count(), 1);

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.remote_addr, addr);
        assert!(registry.is_empty());
        assert!(!registry.set_identity(id, "admin"));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let other = registry.clone();
        other.register(SessionId::new(), "127.0.0.1:1".parse().unwrap(), Utc::now());
        assert_eq!(registry.len(), 1);
    }
}
