use super::reply::Reply;
use crate::error::ServerError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Hands out listening sockets for passive data connections.
///
/// With a configured range, ports are tried round-robin starting after the
/// last one handed out, so concurrent sessions spread over the range.
#[derive(Debug)]
pub struct PassivePorts {
    range: Option<(u16, u16)>,
    next: AtomicU16,
}

impl PassivePorts {
    pub fn new(range: Option<(u16, u16)>) -> Self {
        let start = range.map(|(low, _)| low).unwrap_or(0);
        Self {
            range,
            next: AtomicU16::new(start),
        }
    }

    /// Binds a listener on `ip` using the first free port in the range.
    pub async fn bind(&self, ip: IpAddr) -> Result<TcpListener, ServerError> {
        let Some((low, high)) = self.range else {
            return TcpListener::bind(SocketAddr::new(ip, 0))
                .await
                .map_err(|e| ServerError::Network(format!("failed to open passive port: {e}")));
        };

        let span = u32::from(high - low) + 1;
        for _ in 0..span {
            let offset = self.next.fetch_add(1, Ordering::Relaxed).wrapping_sub(low);
            let port = low + (u32::from(offset) % span) as u16;
            match TcpListener::bind(SocketAddr::new(ip, port)).await {
                Ok(listener) => {
                    debug!("Passive listener bound on {}:{}", ip, port);
                    return Ok(listener);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(ServerError::Network(format!("failed to bind passive port {port}: {e}"))),
            }
        }

        Err(ServerError::Network(format!("no free passive port in {low}-{high}")))
    }
}

/// Waits for the client to connect to a passive listener.
pub async fn accept_data(listener: TcpListener, timeout: Duration) -> Result<TcpStream, ServerError> {
    match tokio::time::timeout(timeout, listener.accept()).await {
        Ok(Ok((stream, peer))) => {
            debug!("Data connection from {}", peer);
            Ok(stream)
        }
        Ok(Err(e)) => Err(ServerError::Network(format!("data connection failed: {e}"))),
        Err(_) => Err(ServerError::Network(format!(
            "no data connection within {}s",
            timeout.as_secs()
        ))),
    }
}

/// `227` reply advertising `ip:port`.
pub fn pasv_reply(ip: Ipv4Addr, port: u16) -> Reply {
    let [a, b, c, d] = ip.octets();
    Reply::new(
        227,
        format!("Entering Passive Mode ({},{},{},{},{},{}).", a, b, c, d, port >> 8, port & 0xff),
    )
}

/// `229` reply advertising `port` on the control connection's address.
pub fn epsv_reply(port: u16) -> Reply {
    Reply::new(229, format!("Entering Extended Passive Mode (|||{port}|)."))
}
