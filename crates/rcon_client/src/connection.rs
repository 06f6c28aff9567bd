//! A single authenticated RCON connection.

use crate::error::RconError;
use crate::packet::{Packet, PacketType, MAX_COMMAND_LEN};
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Request id used for the authentication packet.
const AUTH_REQUEST_ID: i32 = 0x4c55;

/// An open, authenticated connection to a remote console.
///
/// Connections are cheap and short-lived: open one, run a command, drop it.
pub struct RconConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: i32,
}

impl RconConnection {
    /// Connects to `address` and authenticates with `password`.
    ///
    /// Source engine servers send an empty `RESPONSE_VALUE` ahead of the
    /// `AUTH_RESPONSE`; Minecraft does not. Both orders are accepted.
    pub async fn connect(address: &str, password: &str) -> Result<Self, RconError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut connection = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_id: AUTH_REQUEST_ID + 1,
        };

        Packet::new(AUTH_REQUEST_ID, PacketType::Auth, password)
            .write_to(&mut connection.writer)
            .await?;

        loop {
            let reply = Packet::read_from(&mut connection.reader).await?;
            match reply.kind {
                PacketType::ResponseValue => continue,
                PacketType::AuthResponse if reply.id == -1 => {
                    return Err(RconError::AuthRejected(address.to_string()));
                }
                PacketType::AuthResponse if reply.id == AUTH_REQUEST_ID => break,
                _ => {
                    return Err(RconError::Malformed(format!(
                        "unexpected auth reply id {}",
                        reply.id
                    )));
                }
            }
        }

        debug!("RCON session authenticated with {}", address);
        Ok(connection)
    }

    /// Runs one command and returns the server's textual reply.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(RconError::CommandTooLong(command.len()));
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        Packet::new(id, PacketType::ExecCommand, command)
            .write_to(&mut self.writer)
            .await?;

        loop {
            let reply = Packet::read_from(&mut self.reader).await?;
            if reply.id == id && reply.kind == PacketType::ResponseValue {
                return Ok(reply.body);
            }
            debug!("Skipping unrelated RCON packet id {}", reply.id);
        }
    }
}
