use std::time::Duration;

/// Errors produced while talking to a remote console.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// Socket-level failure (refused, reset, closed mid-packet)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The server rejected the password
    #[error("Authentication rejected by {0}")]
    AuthRejected(String),
    /// The server sent something that is not a valid RCON packet
    #[error("Malformed packet: {0}")]
    Malformed(String),
    /// The command exceeds what servers accept in one packet
    #[error("Command too long ({0} bytes)")]
    CommandTooLong(usize),
    /// No reply arrived in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}
