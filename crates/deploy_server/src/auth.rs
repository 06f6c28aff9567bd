//! Login checks for transfer sessions.

use crate::config::Credentials;
use async_trait::async_trait;

/// Decides whether an identity/secret pair may log in.
///
/// Implementations must be deterministic: the same pair always yields the
/// same answer, independent of how many attempts came before.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, identity: &str, secret: &str) -> bool;
}

/// Accepts exactly one configured identity/secret pair.
#[derive(Debug, Clone)]
pub struct FixedCredentialAuthenticator {
    credentials: Credentials,
}

impl FixedCredentialAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Authenticator for FixedCredentialAuthenticator {
    async fn authenticate(&self, identity: &str, secret: &str) -> bool {
        // Both halves are always compared.
        let identity_ok = constant_time_eq(identity.as_bytes(), self.credentials.username.as_bytes());
        let secret_ok = constant_time_eq(secret.as_bytes(), self.credentials.password.as_bytes());
        identity_ok & secret_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
