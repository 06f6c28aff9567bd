//! # RCON Client
//!
//! Minimal asynchronous client for the Source RCON protocol, the remote
//! console most game servers (Minecraft included) expose for administration.
//!
//! The crate offers two layers:
//!
//! * [`RconConnection`] - one authenticated TCP session that can run commands
//! * [`RemoteConsole`] - the one-shot seam the rest of the workspace depends
//!   on: connect, run a single command, disconnect
//!
//! [`RconClient`] implements [`RemoteConsole`] by opening a fresh connection
//! per call. There is no pooling; every call pays for its own handshake.
//!
//! ```rust,no_run
//! use rcon_client::{ConsoleEndpoint, RconClient, RemoteConsole};
//!
//! # async fn demo() -> Result<(), rcon_client::RconError> {
//! let client = RconClient::default();
//! let endpoint = ConsoleEndpoint::new("127.0.0.1", 25575, "secret");
//! let reply = client.execute(&endpoint, "list").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod packet;

pub use connection::RconConnection;
pub use error::RconError;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Where a remote console listens and how to log into it.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsoleEndpoint {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConsoleEndpoint {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConsoleEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sends a single command to a running server process.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    /// Connects, authenticates, runs `command` and returns the reply text.
    async fn execute(&self, endpoint: &ConsoleEndpoint, command: &str) -> Result<String, RconError>;
}

/// [`RemoteConsole`] over real RCON connections, one per call.
#[derive(Debug, Clone)]
pub struct RconClient {
    timeout: Duration,
}

impl RconClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RconClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl RemoteConsole for RconClient {
    async fn execute(&self, endpoint: &ConsoleEndpoint, command: &str) -> Result<String, RconError> {
        let address = endpoint.address();
        let exchange = async {
            let mut connection = RconConnection::connect(&address, &endpoint.password).await?;
            connection.execute(command).await
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RconError::Timeout(self.timeout))??;

        debug!("RCON {} <- {:?}", address, command);
        Ok(reply)
    }
}
