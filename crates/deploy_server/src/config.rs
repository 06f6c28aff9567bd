//! Runtime configuration for the deployment server.
//!
//! These are the immutable, already-validated settings the server runs with.
//! They are built once at startup (the binary converts its TOML file into
//! them) and shared behind `Arc` afterwards.

use rcon_client::ConsoleEndpoint;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// The single login accepted by the transfer endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transfer endpoint configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address the control connection listens on
    pub bind_address: SocketAddr,

    /// Directory exposed to clients as `/`
    pub root_directory: PathBuf,

    /// Accepted login
    pub credentials: Credentials,

    /// Inclusive port range for passive data connections; `None` lets the OS pick
    pub passive_ports: Option<(u16, u16)>,

    /// Address advertised in passive replies instead of the local socket address
    pub masquerade_address: Option<IpAddr>,

    /// Maximum number of concurrent sessions
    pub max_connections: usize,

    /// Idle time after which a control connection is dropped
    pub idle_timeout: Duration,

    /// How long to wait for a client to open a passive data connection, and
    /// the longest an upload's data connection may stay silent
    pub data_timeout: Duration,

    /// File extension (without the dot) that marks a plugin archive
    pub archive_extension: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 2121)),
            root_directory: PathBuf::from("plugins"),
            credentials: Credentials::new("admin", ""),
            passive_ports: Some((60000, 60100)),
            masquerade_address: None,
            max_connections: 32,
            idle_timeout: Duration::from_secs(300),
            data_timeout: Duration::from_secs(30),
            archive_extension: "jar".to_string(),
        }
    }
}

/// Remote console settings shared by bootstrap and the RCON reload strategy.
#[derive(Debug, Clone)]
pub struct RemoteConsoleSettings {
    /// Path of the game server's `server.properties`
    pub properties_path: PathBuf,
    pub endpoint: ConsoleEndpoint,
    pub timeout: Duration,
}

/// Terminal multiplexer the game server console runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    Screen,
    Tmux,
}

impl Multiplexer {
    pub fn program(self) -> &'static str {
        match self {
            Multiplexer::Screen => "screen",
            Multiplexer::Tmux => "tmux",
        }
    }
}

/// How reload triggers reach the game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// Type the command into a detached multiplexer session
    ConsoleInjection {
        multiplexer: Multiplexer,
        session: String,
        window: String,
    },
    /// Send the command over RCON
    RemoteConsole,
}

#[derive(Debug, Clone)]
pub struct ReloadConfig {
    pub strategy: ReloadStrategy,
    /// Command template; `{plugin}` is replaced by the archive's plugin name
    pub command: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            strategy: ReloadStrategy::ConsoleInjection {
                multiplexer: Multiplexer::Screen,
                session: "minecraft".to_string(),
                window: "0".to_string(),
            },
            command: "reload".to_string(),
        }
    }
}
