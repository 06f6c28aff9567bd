use crate::error::{AuthError, ServerError};
use std::io::ErrorKind;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A control-connection reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// A multi-line reply. The first and last lines carry the code; the
    /// ones in between are indented by one space.
    pub fn multiline(code: u16, first: impl Into<String>, body: Vec<String>, last: impl Into<String>) -> Self {
        let mut lines = Vec::with_capacity(body.len() + 2);
        lines.push(first.into());
        lines.extend(body);
        lines.push(last.into());
        Self { code, lines }
    }

    pub fn text(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    /// Wire form, CRLF terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self.lines.as_slice() {
            [] => out.push_str(&format!("{}\r\n", self.code)),
            [only] => out.push_str(&format!("{} {}\r\n", self.code, only)),
            [first, body @ .., last] => {
                out.push_str(&format!("{}-{}\r\n", self.code, first));
                for line in body {
                    out.push_str(&format!(" {line}\r\n"));
                }
                out.push_str(&format!("{} {}\r\n", self.code, last));
            }
        }
        out
    }

    pub async fn send<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        writer.write_all(self.render().as_bytes()).await?;
        writer.flush().await
    }

    /// Maps an operation failure onto the reply the client sees.
    pub fn from_error(error: &ServerError) -> Self {
        match error {
            ServerError::Auth(AuthError::NotAuthenticated) => Reply::new(530, "Please login with USER and PASS."),
            ServerError::Auth(AuthError::InvalidCredentials) => Reply::new(530, "Login incorrect."),
            ServerError::SessionClosed => Reply::new(421, "Session closed."),
            ServerError::Protocol(message) => Reply::new(503, message.clone()),
            ServerError::Network(message) => Reply::new(426, format!("Connection closed; transfer aborted: {message}")),
            ServerError::Io { source, .. } => match source.kind() {
                ErrorKind::NotFound => Reply::new(550, "No such file or directory."),
                ErrorKind::PermissionDenied => Reply::new(550, "Permission denied."),
                ErrorKind::AlreadyExists => Reply::new(550, "File exists."),
                _ => Reply::new(451, format!("Requested action aborted: {source}")),
            },
        }
    }
}
