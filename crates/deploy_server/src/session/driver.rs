use super::path::{normalize, to_physical};
use super::{Session, SessionState};
use crate::auth::Authenticator;
use crate::error::{AuthError, ServerError};
use crate::upload::{UploadPipeline, UploadTransfer, WriteMode};
use chrono::{DateTime, Utc};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Permission bits (`0o755` style); synthesised on platforms without them
    pub mode: u32,
}

/// Maps session operations onto the filesystem under one root directory.
///
/// The driver is shared by every connection. All per-connection state lives
/// in the [`Session`] passed to each call, so there is no locking here.
#[derive(Clone)]
pub struct SessionDriver {
    authenticator: Arc<dyn Authenticator>,
    pipeline: Arc<UploadPipeline>,
    root: PathBuf,
}

impl SessionDriver {
    pub fn new(authenticator: Arc<dyn Authenticator>, pipeline: Arc<UploadPipeline>, root: impl Into<PathBuf>) -> Self {
        Self {
            authenticator,
            pipeline,
            root: root.into(),
        }
    }

    /// The physical directory clients see as `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads(&self) -> &Arc<UploadPipeline> {
        &self.pipeline
    }

    /// Creates a fresh, unauthenticated session for a new connection.
    pub fn open_session(&self, remote_addr: SocketAddr) -> Session {
        let session = Session::new(remote_addr);
        debug!("Session {} opened for {}", session.id(), remote_addr);
        session
    }

    /// Verifies `identity`/`secret` and logs the session in on success.
    ///
    /// Failure leaves the session unauthenticated and may be retried any
    /// number of times.
    pub async fn authenticate(&self, session: &mut Session, identity: &str, secret: &str) -> Result<(), ServerError> {
        if session.is_closed() {
            return Err(ServerError::SessionClosed);
        }

        if self.authenticator.authenticate(identity, secret).await {
            info!("🔐 Session {} logged in as '{}'", session.id(), identity);
            session.state = SessionState::Authenticated {
                identity: identity.to_string(),
            };
            Ok(())
        } else {
            warn!("Failed login for '{}' from {}", identity, session.remote_addr());
            Err(AuthError::InvalidCredentials.into())
        }
    }

    /// Moves the session to its terminal state.
    pub fn close(&self, session: &mut Session) {
        if !session.is_closed() {
            debug!("Session {} closed", session.id());
            session.state = SessionState::Closed;
        }
    }

    /// Normalises `requested` against the session's working directory.
    pub fn virtual_path(&self, session: &Session, requested: &str) -> String {
        normalize(session.cwd(), requested)
    }

    /// Physical location of `requested`, always inside the root.
    pub fn resolve(&self, session: &Session, requested: &str) -> Result<PathBuf, ServerError> {
        ensure_active(session)?;
        Ok(to_physical(&self.root, &self.virtual_path(session, requested)))
    }

    pub fn current_directory<'s>(&self, session: &'s Session) -> Result<&'s str, ServerError> {
        ensure_active(session)?;
        Ok(session.cwd())
    }

    /// Changes the working directory; the target must be an existing directory.
    pub async fn change_directory(&self, session: &mut Session, requested: &str) -> Result<String, ServerError> {
        ensure_active(session)?;
        let target = self.virtual_path(session, requested);
        let physical = to_physical(&self.root, &target);

        let metadata = tokio::fs::metadata(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;
        if !metadata.is_dir() {
            return Err(ServerError::io(&physical, not_a_directory()));
        }

        session.cwd = target.clone();
        Ok(target)
    }

    /// Lists a directory, or describes a single file when `requested` names one.
    pub async fn list(&self, session: &Session, requested: &str) -> Result<Vec<DirEntry>, ServerError> {
        let physical = self.resolve(session, requested)?;
        let metadata = tokio::fs::symlink_metadata(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;

        if !metadata.is_dir() {
            let name = physical
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(vec![describe(name, &metadata)]);
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;
        while let Some(entry) = reader.next_entry().await.map_err(|e| ServerError::io(&physical, e))? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Raced with a delete.
                Err(_) => continue,
            };
            entries.push(describe(entry.file_name().to_string_lossy().into_owned(), &metadata));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn mkdir(&self, session: &Session, requested: &str) -> Result<String, ServerError> {
        let physical = self.resolve(session, requested)?;
        tokio::fs::create_dir(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;
        Ok(self.virtual_path(session, requested))
    }

    /// Removes an empty directory.
    pub async fn rmdir(&self, session: &Session, requested: &str) -> Result<(), ServerError> {
        let physical = self.resolve(session, requested)?;
        if physical == self.root {
            return Err(ServerError::io(&physical, permission_denied("cannot remove the root")));
        }
        tokio::fs::remove_dir(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))
    }

    pub async fn remove(&self, session: &Session, requested: &str) -> Result<(), ServerError> {
        let physical = self.resolve(session, requested)?;
        tokio::fs::remove_file(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))
    }

    pub async fn rename(&self, session: &Session, from: &str, to: &str) -> Result<(), ServerError> {
        let source = self.resolve(session, from)?;
        let target = self.resolve(session, to)?;
        if source == self.root {
            return Err(ServerError::io(&source, permission_denied("cannot rename the root")));
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| ServerError::io(&source, e))?;
        info!("Session {} renamed {} -> {}", session.id(), source.display(), target.display());
        Ok(())
    }

    /// Applies permission bits. Outside unix only the owner-write bit is honoured.
    pub async fn chmod(&self, session: &Session, requested: &str, mode: u32) -> Result<(), ServerError> {
        let physical = self.resolve(session, requested)?;
        let metadata = tokio::fs::metadata(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;

        let permissions = permissions_for(metadata.permissions(), mode);
        tokio::fs::set_permissions(&physical, permissions)
            .await
            .map_err(|e| ServerError::io(&physical, e))
    }

    /// Sets both access and modification time of `requested` to `modified`.
    pub async fn set_times(&self, session: &Session, requested: &str, modified: DateTime<Utc>) -> Result<(), ServerError> {
        let physical = self.resolve(session, requested)?;
        let when = std::time::SystemTime::from(modified);

        let target = physical.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&target)?;
            file.set_times(std::fs::FileTimes::new().set_accessed(when).set_modified(when))
        })
        .await
        .map_err(|e| ServerError::io(&physical, io::Error::new(io::ErrorKind::Other, e)))?
        .map_err(|e| ServerError::io(&physical, e))
    }

    /// Size in bytes of a regular file.
    pub async fn file_size(&self, session: &Session, requested: &str) -> Result<u64, ServerError> {
        let physical = self.resolve(session, requested)?;
        let metadata = tokio::fs::metadata(&physical)
            .await
            .map_err(|e| ServerError::io(&physical, e))?;
        if !metadata.is_file() {
            return Err(ServerError::io(&physical, io::Error::new(io::ErrorKind::Other, "not a regular file")));
        }
        Ok(metadata.len())
    }

    /// Opens `requested` for an upload through the pipeline.
    pub async fn open_for_write(&self, session: &Session, requested: &str, append: bool) -> Result<UploadTransfer, ServerError> {
        let physical = self.resolve(session, requested)?;
        self.pipeline.begin(physical, WriteMode::from_append(append)).await
    }

    /// Storage space is never checked.
    pub fn can_allocate(&self, _size: u64) -> bool {
        true
    }
}

fn ensure_active(session: &Session) -> Result<(), ServerError> {
    match session.state() {
        SessionState::Authenticated { .. } => Ok(()),
        SessionState::Unauthenticated => Err(AuthError::NotAuthenticated.into()),
        SessionState::Closed => Err(ServerError::SessionClosed),
    }
}

fn describe(name: String, metadata: &std::fs::Metadata) -> DirEntry {
    let kind = if metadata.file_type().is_symlink() {
        EntryKind::Symlink
    } else if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    DirEntry {
        name,
        kind,
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        mode: mode_of(metadata),
    }
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(metadata: &std::fs::Metadata) -> u32 {
    let base = if metadata.is_dir() { 0o755 } else { 0o644 };
    if metadata.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}

#[cfg(unix)]
fn permissions_for(_current: std::fs::Permissions, mode: u32) -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    std::fs::Permissions::from_mode(mode & 0o7777)
}

#[cfg(not(unix))]
fn permissions_for(mut current: std::fs::Permissions, mode: u32) -> std::fs::Permissions {
    current.set_readonly(mode & 0o200 == 0);
    current
}

fn not_a_directory() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "not a directory")
}

fn permission_denied(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FixedCredentialAuthenticator;
    use crate::config::Credentials;
    use crate::error::DispatchError;
    use crate::reload::ReloadDispatcher;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tempfile::TempDir;

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

    fn driver(root: &Path) -> SessionDriver {
        SessionDriver::new(
            Arc::new(FixedCredentialAuthenticator::new(Credentials::new("admin", "pw"))),
            Arc::new(UploadPipeline::new(Arc::new(NoopDispatcher), "jar")),
            root,
        )
    }

    async fn logged_in(driver: &SessionDriver) -> Session {
        let mut session = driver.open_session("127.0.0.1:40000".parse().unwrap());
        driver
            .authenticate(&mut session, "admin", "pw")
            .await
            .expect("Failed to log in");
        session
    }

    #[tokio::test]
    async fn test_failed_login_is_retryable() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let mut session = driver.open_session("127.0.0.1:40000".parse().unwrap());

        for _ in 0..5 {
            let result = driver.authenticate(&mut session, "admin", "wrong").await;
            assert!(matches!(result, Err(ServerError::Auth(AuthError::InvalidCredentials))));
            assert_eq!(session.state(), &SessionState::Unauthenticated);
        }

        driver.authenticate(&mut session, "admin", "pw").await.unwrap();
        assert_eq!(session.identity(), Some("admin"));
    }

    #[tokio::test]
    async fn test_operations_require_login() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let session = driver.open_session("127.0.0.1:40000".parse().unwrap());

        let not_logged_in = |r: Result<(), ServerError>| {
            matches!(r, Err(ServerError::Auth(AuthError::NotAuthenticated)))
        };

        assert!(not_logged_in(driver.mkdir(&session, "x").await.map(|_| ())));
        assert!(not_logged_in(driver.list(&session, "/").await.map(|_| ())));
        assert!(not_logged_in(driver.remove(&session, "x").await));
        assert!(not_logged_in(driver.open_for_write(&session, "a.jar", false).await.map(|_| ())));
        assert!(!dir.path().join("x").exists());
        assert!(!dir.path().join("a.jar").exists());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let mut session = logged_in(&driver).await;

        driver.close(&mut session);

        assert!(matches!(driver.mkdir(&session, "x").await, Err(ServerError::SessionClosed)));
        assert!(matches!(
            driver.authenticate(&mut session, "admin", "pw").await,
            Err(ServerError::SessionClosed)
        ));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_directory_operations() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let mut session = logged_in(&driver).await;

        assert_eq!(driver.mkdir(&session, "configs").await.unwrap(), "/configs");
        assert_eq!(driver.change_directory(&mut session, "configs").await.unwrap(), "/configs");
        assert_eq!(driver.current_directory(&session).unwrap(), "/configs");

        tokio::fs::write(dir.path().join("configs/a.yml"), b"a: 1").await.unwrap();
        let listing = driver.list(&session, "").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "a.yml");
        assert_eq!(listing[0].kind, EntryKind::File);
        assert_eq!(listing[0].size, 4);

        driver.rename(&session, "a.yml", "/b.yml").await.unwrap();
        assert!(dir.path().join("b.yml").exists());

        driver.change_directory(&mut session, "..").await.unwrap();
        driver.rmdir(&session, "configs").await.unwrap();
        driver.remove(&session, "b.yml").await.unwrap();
        assert!(driver.list(&session, "/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failures_carry_cause() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let mut session = logged_in(&driver).await;

        let err = driver.remove(&session, "missing.jar").await.unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));

        let err = driver.mkdir(&session, "a/b/c").await.unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));

        tokio::fs::create_dir(dir.path().join("full")).await.unwrap();
        tokio::fs::write(dir.path().join("full/x"), b"").await.unwrap();
        assert!(driver.rmdir(&session, "full").await.is_err());
        assert!(dir.path().join("full/x").exists());

        tokio::fs::write(dir.path().join("file"), b"").await.unwrap();
        assert!(driver.change_directory(&mut session, "file").await.is_err());
        assert_eq!(session.cwd(), "/");
    }

    #[tokio::test]
    async fn test_root_cannot_be_escaped_or_removed() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let mut session = logged_in(&driver).await;

        assert_eq!(driver.resolve(&session, "../../etc/passwd").unwrap(), dir.path().join("etc/passwd"));
        assert_eq!(driver.change_directory(&mut session, "../..").await.unwrap(), "/");
        assert!(driver.rmdir(&session, "/").await.is_err());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_size_and_times() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let session = logged_in(&driver).await;
        tokio::fs::write(dir.path().join("p.jar"), b"12345").await.unwrap();

        assert_eq!(driver.file_size(&session, "p.jar").await.unwrap(), 5);
        assert!(driver.file_size(&session, "/").await.is_err());

        let stamp = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();
        driver.set_times(&session, "p.jar", stamp).await.unwrap();
        let listing = driver.list(&session, "p.jar").await.unwrap();
        assert_eq!(listing[0].modified, Some(stamp));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chmod_sets_mode() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let session = logged_in(&driver).await;
        tokio::fs::write(dir.path().join("run.sh"), b"").await.unwrap();

        driver.chmod(&session, "run.sh", 0o750).await.unwrap();

        let listing = driver.list(&session, "run.sh").await.unwrap();
        assert_eq!(listing[0].mode, 0o750);
    }

    #[tokio::test]
    async fn test_open_for_write_modes() {
        let dir = TempDir::new().unwrap();
        let driver = driver(dir.path());
        let session = logged_in(&driver).await;

        let mut transfer = driver.open_for_write(&session, "log.txt", false).await.unwrap();
        transfer.write(b"one").await.unwrap();
        driver.uploads().complete(transfer).await.unwrap();

        let mut transfer = driver.open_for_write(&session, "log.txt", true).await.unwrap();
        assert_eq!(transfer.mode(), WriteMode::Append);
        transfer.write(b"two").await.unwrap();
        driver.uploads().complete(transfer).await.unwrap();

        assert_eq!(tokio::fs::read(dir.path().join("log.txt")).await.unwrap(), b"onetwo");
        assert!(driver.can_allocate(u64::MAX));
    }
}
