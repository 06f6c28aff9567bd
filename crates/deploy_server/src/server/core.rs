//! The transfer server: listener setup and the accept loop.

use super::registry::SessionRegistry;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ftp::{handle_connection, FtpContext, Reply};
use crate::session::SessionDriver;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts control connections and runs one task per session.
///
/// # Lifecycle
///
/// 1. [`TransferServer::bind`] opens the listening socket
/// 2. [`TransferServer::serve`] accepts until [`TransferServer::shutdown`]
/// 3. Shutdown stops accepting and tells every open session to say `421`
///
/// [`TransferServer::start`] does 1 and 2 in one call.
pub struct TransferServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Shared protocol state handed to each connection
    context: Arc<FtpContext>,

    /// Open sessions
    registry: SessionRegistry,

    /// One permit per allowed concurrent session
    slots: Arc<Semaphore>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl TransferServer {
    /// Creates a new server around `driver`.
    ///
    /// # Arguments
    ///
    /// * `config` - Listener, passive port and timeout settings
    /// * `driver` - The session driver every connection uses
    pub fn new(config: ServerConfig, driver: Arc<SessionDriver>) -> Self {
        let registry = SessionRegistry::new();
        let context = Arc::new(FtpContext::new(&config, driver, registry.clone()));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            slots: Arc::new(Semaphore::new(config.max_connections)),
            config,
            context,
            registry,
            shutdown_sender,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Opens the control listener on the configured address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.config.bind_address;
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        socket
            .bind(&address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed on {address}: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::Network(format!("Failed to make listener non-blocking: {e}")))?;

        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))?;

        info!("✅ Transfer endpoint bound on {}", address);
        Ok(listener)
    }

    /// Binds and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Runs the accept loop on `listener` until [`TransferServer::shutdown`].
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!(
            "🚀 Accepting uploads on {} (root: {}, max sessions: {})",
            local,
            self.context.driver.root().display(),
            self.config.max_connections
        );

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("🧹 Transfer endpoint stopped ({} session(s) still closing)", self.registry.len());
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, addr: std::net::SocketAddr) {
        let Ok(permit) = self.slots.clone().try_acquire_owned() else {
            warn!("Connection limit reached, rejecting {}", addr);
            tokio::spawn(async move {
                let mut stream = stream;
                let _ = Reply::new(421, "Too many connections, try again later.")
                    .send(&mut stream)
                    .await;
            });
            return;
        };

        let context = self.context.clone();
        let shutdown = self.shutdown_sender.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, context, shutdown).await {
                warn!("Session from {} ended with error: {}", addr, e);
            }
            drop(permit);
        });
    }

    /// Stops the accept loop and closes every open session.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down transfer endpoint");
        let _ = self.shutdown_sender.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FixedCredentialAuthenticator;
    use crate::config::Credentials;
    use crate::error::DispatchError;
    use crate::reload::ReloadDispatcher;
    use crate::upload::UploadPipeline;
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct NoopDispatcher;

    #[async_trait]
    impl ReloadDispatcher for NoopDispatcher {
        async fn trigger(&self, _archive: &Path) -> Result<(), DispatchError> {
            Ok(())
        }

        fn strategy(&self) -> &'static str {
            "noop"
        }
    }

    fn server(root: &Path, max_connections: usize) -> Arc<TransferServer> {
        let config = ServerConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            root_directory: root.to_path_buf(),
            max_connections,
            ..ServerConfig::default()
        };
        let driver = SessionDriver::new(
            Arc::new(FixedCredentialAuthenticator::new(Credentials::new("admin", "pw"))),
            Arc::new(UploadPipeline::new(Arc::new(NoopDispatcher), "jar")),
            root,
        );
        Arc::new(TransferServer::new(config, Arc::new(driver)))
    }

    async fn first_line(stream: TcpStream) -> String {
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_greeting_and_connection_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = server(dir.path(), 1);
        let listener = server.bind().expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let running = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        let first = TcpStream::connect(addr).await.unwrap();
        let mut first = BufReader::new(first);
        let mut greeting = String::new();
        first.read_line(&mut greeting).await.unwrap();
        assert!(greeting.starts_with("220 "));

        let second = TcpStream::connect(addr).await.unwrap();
        assert!(first_line(second).await.starts_with("421 "));

        server.shutdown();
        running.await.unwrap().expect("Server returned an error");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_network_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

        let mut config = ServerConfig::default();
        config.bind_address = occupied.local_addr().unwrap();
        let driver = SessionDriver::new(
            Arc::new(FixedCredentialAuthenticator::new(Credentials::new("admin", "pw"))),
            Arc::new(UploadPipeline::new(Arc::new(NoopDispatcher), "jar")),
            dir.path(),
        );
        let server = TransferServer::new(config, Arc::new(driver));

        assert!(matches!(server.bind(), Err(ServerError::Network(_))));
    }
}
