//! Error taxonomy for the deployment server.
//!
//! * [`AuthError`] - bad credentials or use before login; the client can retry
//! * [`ServerError::Io`] - a storage primitive failed for one operation
//! * [`DispatchError`] - a reload trigger could not be delivered; logged only
//! * [`BootstrapError`] - settings could not be prepared; fatal at startup
//!
//! Per-session failures never escape the session that caused them.

use plugin_manifest::ManifestError;
use rcon_client::RconError;
use server_properties::PropertiesError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Identity/secret did not match
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// A file operation was attempted before logging in
    #[error("Not logged in")]
    NotAuthenticated,
}

/// Errors surfaced to a session for the operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session was already closed
    #[error("Session closed")]
    SessionClosed,

    /// The client broke protocol (bad sequence, bad arguments)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Socket setup or transport failure
    #[error("Network error: {0}")]
    Network(String),
}

impl ServerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ServerError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Kind of the underlying I/O failure, if this is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            ServerError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// A reload trigger could not be transmitted.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The multiplexer binary could not be started
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The multiplexer ran but reported failure (e.g. no such session)
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Remote console error: {0}")]
    Console(#[from] RconError),

    /// The command needs the plugin name but the archive could not be read
    #[error("Failed to read plugin manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// The command needs the plugin name but the archive declares none
    #[error("No plugin name found in {}", .0.display())]
    PluginNameMissing(PathBuf),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Startup could not bring the settings store into the required state.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to load server settings: {0}")]
    Load(#[source] PropertiesError),
    #[error("Failed to store server settings: {0}")]
    Store(#[source] PropertiesError),
}
