//! Upload lifecycle and the reload hook.
//!
//! Every file write goes through [`UploadPipeline`]:
//!
//! 1. [`UploadPipeline::begin`] opens the destination (truncate or append)
//! 2. [`UploadTransfer::write`] forwards bytes and counts them
//! 3. [`UploadPipeline::complete`] closes the file and, if its name ends in
//!    the plugin archive extension, fires exactly one reload trigger
//!
//! [`UploadPipeline::abort`] closes without triggering. A transfer that is
//! simply dropped (its connection task torn down) also never triggers.
//!
//! Detection is a plain suffix test on the file name. Archive contents are
//! not validated before the trigger fires.

use crate::error::ServerError;
use crate::reload::ReloadDispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Size of the buffer used when draining a data connection.
const RECEIVE_CHUNK: usize = 64 * 1024;

/// How an upload treats existing content at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file or cut it to zero length
    Truncate,
    /// Create the file if needed and add to its end
    Append,
}

impl WriteMode {
    pub fn from_append(append: bool) -> Self {
        if append {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Open,
    Failed,
}

/// One in-flight file write.
#[derive(Debug)]
pub struct UploadTransfer {
    path: PathBuf,
    mode: WriteMode,
    file: File,
    bytes_written: u64,
    state: TransferState,
}

impl UploadTransfer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Forwards `bytes` to the destination.
    ///
    /// A failed write leaves the transfer in [`TransferState::Failed`]; all
    /// later writes are refused.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ServerError> {
        if self.state == TransferState::Failed {
            return Err(self.failed_error());
        }

        match self.file.write_all(bytes).await {
            Ok(()) => {
                self.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.state = TransferState::Failed;
                Err(ServerError::io(&self.path, e))
            }
        }
    }

    fn failed_error(&self) -> ServerError {
        ServerError::io(
            &self.path,
            std::io::Error::new(std::io::ErrorKind::Other, "transfer already failed"),
        )
    }
}

/// Owns the create/append/complete lifecycle of uploads.
#[derive(Clone)]
pub struct UploadPipeline {
    dispatcher: Arc<dyn ReloadDispatcher>,
    archive_suffix: String,
}

impl UploadPipeline {
    /// `archive_extension` is given without the dot, e.g. `"jar"`.
    pub fn new(dispatcher: Arc<dyn ReloadDispatcher>, archive_extension: &str) -> Self {
        Self {
            dispatcher,
            archive_suffix: format!(".{}", archive_extension.trim_start_matches('.')),
        }
    }

    /// True when `path`'s file name ends with the archive extension.
    pub fn is_plugin_archive(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(&self.archive_suffix))
            .unwrap_or(false)
    }

    /// Opens `path` for writing in `mode`.
    pub async fn begin(&self, path: PathBuf, mode: WriteMode) -> Result<UploadTransfer, ServerError> {
        let mut options = OpenOptions::new();
        match mode {
            WriteMode::Truncate => options.write(true).create(true).truncate(true),
            WriteMode::Append => options.append(true).create(true),
        };

        let file = options.open(&path).await.map_err(|e| ServerError::io(&path, e))?;
        debug!("Opened {} for upload ({:?})", path.display(), mode);

        Ok(UploadTransfer {
            path,
            mode,
            file,
            bytes_written: 0,
            state: TransferState::Open,
        })
    }

    /// Drains `reader` into `transfer` until end of stream.
    ///
    /// Returns the number of bytes moved by this call. A read failure, or a
    /// read that produces nothing within `stall_timeout`, marks the transfer
    /// failed just like a write failure does.
    pub async fn receive<R>(
        &self,
        transfer: &mut UploadTransfer,
        reader: &mut R,
        stall_timeout: Duration,
    ) -> Result<u64, ServerError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; RECEIVE_CHUNK];
        let mut received = 0u64;
        loop {
            let n = match tokio::time::timeout(stall_timeout, reader.read(&mut buf)).await {
                Ok(Ok(0)) => return Ok(received),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    transfer.state = TransferState::Failed;
                    return Err(ServerError::Network(format!("data connection failed: {e}")));
                }
                Err(_) => {
                    transfer.state = TransferState::Failed;
                    return Err(ServerError::Network(format!(
                        "data connection stalled for {}s",
                        stall_timeout.as_secs_f32()
                    )));
                }
            };
            transfer.write(&buf[..n]).await?;
            received += n as u64;
        }
    }

    /// Closes the destination and fires the reload trigger for archives.
    ///
    /// The returned byte count is the transfer's result. Trigger failures are
    /// logged and do not affect it: the file is already committed.
    pub async fn complete(&self, transfer: UploadTransfer) -> Result<u64, ServerError> {
        let UploadTransfer {
            path,
            mut file,
            bytes_written,
            state,
            ..
        } = transfer;

        if state == TransferState::Failed {
            drop(file);
            return Err(ServerError::io(
                &path,
                std::io::Error::new(std::io::ErrorKind::Other, "transfer failed before completion"),
            ));
        }

        file.flush().await.map_err(|e| ServerError::io(&path, e))?;
        file.sync_all().await.map_err(|e| ServerError::io(&path, e))?;
        drop(file);

        info!("📦 Upload complete: {} ({} bytes)", path.display(), bytes_written);

        if self.is_plugin_archive(&path) {
            info!(
                "🔌 Plugin archive uploaded, triggering reload via {}: {}",
                self.dispatcher.strategy(),
                path.display()
            );
            if let Err(e) = self.dispatcher.trigger(&path).await {
                warn!("Reload trigger for {} failed: {}", path.display(), e);
            }
        }

        Ok(bytes_written)
    }

    /// Closes the destination without triggering anything.
    pub async fn abort(&self, transfer: UploadTransfer) {
        warn!(
            "Upload aborted: {} ({} bytes written)",
            transfer.path.display(),
            transfer.bytes_written
        );
        drop(transfer);
    }
}
