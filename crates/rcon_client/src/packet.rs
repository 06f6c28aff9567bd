//! Source RCON packet framing.
//!
//! Every packet on the wire is:
//!
//! ```text
//! | size: i32 LE | id: i32 LE | type: i32 LE | body: ASCII | 0x00 | 0x00 |
//! ```
//!
//! where `size` counts everything after itself (`4 + 4 + body.len() + 2`).

use crate::error::RconError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Smallest legal value of the size field (empty body).
const MIN_PACKET_SIZE: i32 = 10;

/// Largest packet a server is allowed to send back.
pub const MAX_PACKET_SIZE: i32 = 4096 + MIN_PACKET_SIZE;

/// Largest command body servers accept from clients.
pub const MAX_COMMAND_LEN: usize = 1446;

/// Packet type codes.
///
/// `AUTH_RESPONSE` and `EXEC_COMMAND` share the value 2; which one is meant
/// depends on the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Auth,
    AuthResponse,
    ExecCommand,
    ResponseValue,
}

impl PacketType {
    pub fn code(self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::AuthResponse | PacketType::ExecCommand => 2,
            PacketType::ResponseValue => 0,
        }
    }

    /// Interprets a code read from the server.
    fn from_server_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(PacketType::AuthResponse),
            0 => Some(PacketType::ResponseValue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: PacketType,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Serializes the packet into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = (4 + 4 + body.len() + 2) as i32;
        let mut buf = Vec::with_capacity(size as usize + 4);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.code().to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), RconError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads one server-to-client packet.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, RconError> {
        let size = reader.read_i32_le().await?;
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(RconError::Malformed(format!("invalid packet size {size}")));
        }

        let mut payload = vec![0u8; size as usize];
        reader.read_exact(&mut payload).await?;

        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let code = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let kind = PacketType::from_server_code(code)
            .ok_or_else(|| RconError::Malformed(format!("unknown packet type {code}")))?;

        let body = &payload[8..];
        if body.len() < 2 || body[body.len() - 2..] != [0, 0] {
            return Err(RconError::Malformed("missing packet terminator".to_string()));
        }
        let body = String::from_utf8_lossy(&body[..body.len() - 2]).into_owned();

        Ok(Self { id, kind, body })
    }
}
