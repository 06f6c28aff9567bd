use super::command::Command;
use super::listing::{format_list, format_nlst};
use super::passive::{accept_data, epsv_reply, pasv_reply};
use super::reply::Reply;
use super::FtpContext;
use crate::error::ServerError;
use crate::session::Session;
use chrono::Utc;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Longest control line accepted, CRLF included.
const MAX_LINE: usize = 4096;

enum Flow {
    Continue,
    Quit,
}

enum DataKind {
    List,
    Nlst,
}

/// Per-connection protocol state around one [`Session`].
struct Connection {
    ctx: Arc<FtpContext>,
    session: Session,
    writer: OwnedWriteHalf,
    local_ip: IpAddr,
    pending_user: Option<String>,
    rename_from: Option<String>,
    passive: Option<TcpListener>,
    shutdown: broadcast::Receiver<()>,
}

/// Serves one control connection until the client quits, idles out, the
/// connection drops or the server shuts down.
///
/// The session is registered for the lifetime of the call and always closed
/// on the way out. An upload in flight when the connection drops is
/// discarded without a reload trigger.
pub async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    ctx: Arc<FtpContext>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let local_ip = stream
        .local_addr()
        .map_err(|e| ServerError::Network(format!("no local address: {e}")))?
        .ip();
    let (read_half, writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let session = ctx.driver.open_session(remote_addr);
    let id = session.id();
    ctx.registry.register(id, remote_addr, session.connected_at());
    info!("🔗 Session {} connected from {}", id, remote_addr);

    let mut connection = Connection {
        ctx: ctx.clone(),
        session,
        writer,
        local_ip,
        pending_user: None,
        rename_from: None,
        passive: None,
        shutdown,
    };

    let result = connection.run(&mut reader).await;

    connection.ctx.driver.close(&mut connection.session);
    ctx.registry.remove(id);
    info!("👋 Session {} from {} disconnected", id, remote_addr);
    result
}

impl Connection {
    async fn run(&mut self, reader: &mut BufReader<OwnedReadHalf>) -> Result<(), ServerError> {
        self.reply(Reply::new(220, "Plugin deployment service ready.")).await?;

        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let mut limited = (&mut *reader).take(MAX_LINE as u64 + 1);
            let idle_timeout = self.ctx.idle_timeout;
            let read = tokio::select! {
                _ = self.shutdown.recv() => None,
                read = tokio::time::timeout(idle_timeout, limited.read_until(b'\n', &mut buf)) => Some(read),
            };
            let Some(read) = read else {
                self.reply(Reply::new(421, "Server shutting down.")).await?;
                return Ok(());
            };

            match read {
                Err(_) => {
                    debug!("Session {} idle timeout", self.session.id());
                    self.reply(Reply::new(421, "Idle timeout, closing control connection.")).await?;
                    return Ok(());
                }
                Ok(Err(e)) => return Err(ServerError::Network(format!("control connection failed: {e}"))),
                Ok(Ok(0)) => return Ok(()),
                Ok(Ok(_)) => {}
            }

            if buf.len() > MAX_LINE {
                self.reply(Reply::new(500, "Command line too long.")).await?;
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let command = Command::parse(&line);
            match &command {
                Command::Pass(_) => debug!("Session {} <- PASS ****", self.session.id()),
                other => debug!("Session {} <- {:?}", self.session.id(), other),
            }

            if let Flow::Quit = self.dispatch(command).await? {
                return Ok(());
            }
        }
    }

    async fn reply(&mut self, reply: Reply) -> Result<(), ServerError> {
        reply
            .send(&mut self.writer)
            .await
            .map_err(|e| ServerError::Network(format!("failed to send reply: {e}")))
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, ServerError> {
        if requires_login(&command) && !self.session.is_authenticated() {
            self.reply(Reply::new(530, "Please login with USER and PASS.")).await?;
            return Ok(Flow::Continue);
        }

        let reply = match command {
            Command::User(name) => {
                let reply = Reply::new(331, format!("Password required for {name}."));
                self.pending_user = Some(name);
                reply
            }
            Command::Pass(secret) => self.login(&secret).await,
            Command::Syst => Reply::new(215, "UNIX Type: L8"),
            Command::Feat => Reply::multiline(
                211,
                "Features:",
                ["UTF8", "EPSV", "PASV", "SIZE", "MFMT", "SITE CHMOD"]
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
                "End",
            ),
            Command::Opts(option) => {
                if option.eq_ignore_ascii_case("UTF8 ON") {
                    Reply::new(200, "UTF8 mode enabled.")
                } else {
                    Reply::new(501, "Option not understood.")
                }
            }
            Command::Noop => Reply::new(200, "NOOP ok."),
            Command::Type(kind) => match kind.split_whitespace().next() {
                Some("I") | Some("A") | Some("L") => Reply::new(200, format!("Type set to {kind}.")),
                _ => Reply::new(504, "Type not supported."),
            },
            Command::Mode(mode) if mode == "S" => Reply::new(200, "Mode set to S."),
            Command::Mode(_) => Reply::new(504, "Only stream mode is supported."),
            Command::Stru(stru) if stru == "F" => Reply::new(200, "Structure set to F."),
            Command::Stru(_) => Reply::new(504, "Only file structure is supported."),
            Command::Quit => {
                self.reply(Reply::new(221, "Goodbye.")).await?;
                return Ok(Flow::Quit);
            }
            Command::Pwd => match self.ctx.driver.current_directory(&self.session) {
                Ok(cwd) => Reply::new(257, format!("{} is the current directory.", quote_path(cwd))),
                Err(e) => Reply::from_error(&e),
            },
            Command::Cwd(path) => self.change_directory(&path).await,
            Command::Cdup => self.change_directory("..").await,
            Command::Pasv => self.enter_passive(false).await,
            Command::Epsv => self.enter_passive(true).await,
            Command::List(path) => return self.send_listing(&path, DataKind::List).await.map(|_| Flow::Continue),
            Command::Nlst(path) => return self.send_listing(&path, DataKind::Nlst).await.map(|_| Flow::Continue),
            Command::Stor(path) => return self.store(&path, false).await,
            Command::Appe(path) => return self.store(&path, true).await,
            Command::Allo(size) => {
                if self.ctx.driver.can_allocate(size) {
                    Reply::new(202, "No storage allocation necessary.")
                } else {
                    Reply::new(552, "Insufficient storage space.")
                }
            }
            Command::Mkd(path) => match self.ctx.driver.mkdir(&self.session, &path).await {
                Ok(created) => Reply::new(257, format!("{} created.", quote_path(&created))),
                Err(e) => Reply::from_error(&e),
            },
            Command::Rmd(path) => completed(self.ctx.driver.rmdir(&self.session, &path).await, "Directory removed."),
            Command::Dele(path) => completed(self.ctx.driver.remove(&self.session, &path).await, "File deleted."),
            Command::Rnfr(path) => {
                self.rename_from = Some(path);
                Reply::new(350, "Ready for RNTO.")
            }
            Command::Rnto(path) => match self.rename_from.take() {
                Some(from) => completed(self.ctx.driver.rename(&self.session, &from, &path).await, "Rename successful."),
                None => Reply::new(503, "RNFR required first."),
            },
            Command::Chmod { mode, path } => completed(
                self.ctx.driver.chmod(&self.session, &path, mode).await,
                "SITE CHMOD command successful.",
            ),
            Command::Mfmt { modified, path } => match self.ctx.driver.set_times(&self.session, &path, modified).await {
                Ok(()) => Reply::new(213, format!("Modify={}; {}", modified.format("%Y%m%d%H%M%S"), path)),
                Err(e) => Reply::from_error(&e),
            },
            Command::Size(path) => match self.ctx.driver.file_size(&self.session, &path).await {
                Ok(size) => Reply::new(213, size.to_string()),
                Err(e) => Reply::from_error(&e),
            },
            Command::Invalid { verb, reason } => Reply::new(501, format!("{verb}: {reason}.")),
            Command::Unknown(verb) => Reply::new(502, format!("{verb} not implemented.")),
        };

        self.reply(reply).await?;
        Ok(Flow::Continue)
    }

    async fn login(&mut self, secret: &str) -> Reply {
        if self.session.is_authenticated() {
            return Reply::new(230, "Already logged in.");
        }
        let Some(identity) = self.pending_user.take() else {
            return Reply::new(503, "Login with USER first.");
        };

        match self.ctx.driver.authenticate(&mut self.session, &identity, secret).await {
            Ok(()) => {
                self.ctx.registry.set_identity(self.session.id(), &identity);
                Reply::new(230, "Login successful.")
            }
            Err(e) => Reply::from_error(&e),
        }
    }

    async fn change_directory(&mut self, path: &str) -> Reply {
        match self.ctx.driver.change_directory(&mut self.session, path).await {
            Ok(cwd) => Reply::new(250, format!("Directory changed to {cwd}.")),
            Err(e) => Reply::from_error(&e),
        }
    }

    async fn enter_passive(&mut self, extended: bool) -> Reply {
        self.passive = None;

        let advertised = self.ctx.masquerade_address.unwrap_or(self.local_ip);
        let advertised_v4 = match advertised {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        };
        if !extended && advertised_v4.is_none() {
            return Reply::new(425, "PASV needs an IPv4 address; use EPSV.");
        }

        let listener = match self.ctx.passive.bind(self.local_ip).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!("Session {}: {}", self.session.id(), e);
                return Reply::new(425, "Can't open passive connection.");
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(_) => return Reply::new(425, "Can't open passive connection."),
        };
        self.passive = Some(listener);

        match (extended, advertised_v4) {
            (true, _) => epsv_reply(port),
            (false, Some(v4)) => pasv_reply(v4, port),
            (false, None) => Reply::new(425, "PASV needs an IPv4 address; use EPSV."),
        }
    }

    /// Claims the passive listener and waits for the client to connect.
    ///
    /// Sends the `150` preliminary reply first. On failure the final `425`
    /// reply has been sent and `None` is returned.
    async fn open_data(&mut self, listener: TcpListener) -> Result<Option<TcpStream>, ServerError> {
        self.reply(Reply::new(150, "Opening data connection.")).await?;
        match accept_data(listener, self.ctx.data_timeout).await {
            Ok(stream) => Ok(Some(stream)),
            Err(e) => {
                warn!("Session {}: {}", self.session.id(), e);
                self.reply(Reply::new(425, "Can't open data connection.")).await?;
                Ok(None)
            }
        }
    }

    async fn send_listing(&mut self, path: &str, kind: DataKind) -> Result<(), ServerError> {
        let Some(listener) = self.passive.take() else {
            return self.reply(Reply::new(425, "Use PASV or EPSV first.")).await;
        };

        let entries = match self.ctx.driver.list(&self.session, path).await {
            Ok(entries) => entries,
            Err(e) => return self.reply(Reply::from_error(&e)).await,
        };
        let body = match kind {
            DataKind::List => format_list(&entries, Utc::now()),
            DataKind::Nlst => format_nlst(&entries),
        };

        let Some(mut data) = self.open_data(listener).await? else {
            return Ok(());
        };
        let sent = async {
            data.write_all(body.as_bytes()).await?;
            data.shutdown().await
        }
        .await;

        match sent {
            Ok(()) => self.reply(Reply::new(226, "Transfer complete.")).await,
            Err(e) => {
                warn!("Session {}: listing transfer failed: {}", self.session.id(), e);
                self.reply(Reply::new(426, "Connection closed; transfer aborted.")).await
            }
        }
    }

    /// Receives one upload.
    ///
    /// The destination is only opened once the data connection is up, so a
    /// client that never connects leaves an existing file untouched. A
    /// shutdown during the transfer discards it and ends the session.
    async fn store(&mut self, path: &str, append: bool) -> Result<Flow, ServerError> {
        let Some(listener) = self.passive.take() else {
            self.reply(Reply::new(425, "Use PASV or EPSV first.")).await?;
            return Ok(Flow::Continue);
        };

        let Some(mut data) = self.open_data(listener).await? else {
            return Ok(Flow::Continue);
        };

        let mut transfer = match self.ctx.driver.open_for_write(&self.session, path, append).await {
            Ok(transfer) => transfer,
            Err(e) => {
                self.reply(Reply::from_error(&e)).await?;
                return Ok(Flow::Continue);
            }
        };
        let uploads = self.ctx.driver.uploads().clone();

        let data_timeout = self.ctx.data_timeout;
        let received = tokio::select! {
            _ = self.shutdown.recv() => None,
            received = uploads.receive(&mut transfer, &mut data, data_timeout) => Some(received),
        };
        drop(data);

        match received {
            None => {
                uploads.abort(transfer).await;
                self.reply(Reply::new(421, "Server shutting down.")).await?;
                Ok(Flow::Quit)
            }
            Some(Err(e)) => {
                uploads.abort(transfer).await;
                self.reply(Reply::from_error(&e)).await?;
                Ok(Flow::Continue)
            }
            Some(Ok(_)) => {
                let reply = match uploads.complete(transfer).await {
                    Ok(bytes) => Reply::new(226, format!("Transfer complete ({bytes} bytes).")),
                    Err(e) => Reply::from_error(&e),
                };
                self.reply(reply).await?;
                Ok(Flow::Continue)
            }
        }
    }
}

fn requires_login(command: &Command) -> bool {
    !matches!(
        command,
        Command::User(_)
            | Command::Pass(_)
            | Command::Syst
            | Command::Feat
            | Command::Opts(_)
            | Command::Noop
            | Command::Quit
            | Command::Invalid { .. }
            | Command::Unknown(_)
    )
}

fn completed(result: Result<(), ServerError>, message: &str) -> Reply {
    match result {
        Ok(()) => Reply::new(250, message),
        Err(e) => Reply::from_error(&e),
    }
}

/// Quotes a path for a `257` reply; embedded quotes are doubled.
fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}
