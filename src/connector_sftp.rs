//! SFTP remote file server source.
//!
//! Opens a session to `host:port`, authenticates with a username and
//! password, and copies the regular files directly inside the remote
//! directory into the staging directory. Subdirectories are not descended
//! into. The session is closed exactly once, whatever happens after it was
//! opened.

use async_trait::async_trait;
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use crate::ingest::StagingArea;

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Opens sessions to a remote file server.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn TransferSession>, FetchError>;
}

/// An open session. Callers must call [`close`](TransferSession::close)
/// once they are done, including after a failed operation.
#[async_trait]
pub trait TransferSession: Send {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), FetchError>;
    /// Direct children of `path`, excluding `.` and `..`.
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, FetchError>;
    async fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<(), FetchError>;
    async fn close(&mut self) -> Result<(), FetchError>;
}

/// Copy the files directly inside `remote_dir` into the staging directory.
pub async fn fetch_remote_file_server(
    transfer: &dyn FileTransfer,
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    remote_dir: &str,
    staging: &mut StagingArea<'_>,
) -> Result<(), FetchError> {
    let mut session = transfer.connect(host, port).await?;

    let result = copy_directory(session.as_mut(), username, password, remote_dir, staging).await;
    let closed = session.close().await;

    result?;
    if let Err(e) = closed {
        tracing::warn!(host, error = %e, "failed to close SFTP session cleanly");
    }
    Ok(())
}

async fn copy_directory(
    session: &mut dyn TransferSession,
    username: &str,
    password: &str,
    remote_dir: &str,
    staging: &mut StagingArea<'_>,
) -> Result<(), FetchError> {
    session.authenticate(username, password).await?;

    let remote_dir = if remote_dir.is_empty() { "." } else { remote_dir };
    for entry in session.list(remote_dir).await? {
        if entry.is_dir {
            tracing::debug!(name = %entry.name, "skipping remote subdirectory");
            continue;
        }
        if entry.name.contains('/') || entry.name == ".." || entry.name == "." {
            tracing::warn!(name = %entry.name, "skipping remote entry with unsafe name");
            continue;
        }
        let remote_path = join_remote(remote_dir, &entry.name);
        let local_path = staging.root().join(&entry.name);
        session.fetch(&remote_path, &local_path).await?;
        staging.file_written(&local_path);
    }
    Ok(())
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// libssh2-backed implementation
// ═══════════════════════════════════════════════════════════════════════

/// SFTP over libssh2. Blocking calls run on tokio's blocking pool.
pub struct Ssh2Transfer;

#[async_trait]
impl FileTransfer for Ssh2Transfer {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn TransferSession>, FetchError> {
        let host = host.to_string();
        let session = blocking(move || {
            let tcp = TcpStream::connect((host.as_str(), port)).map_err(|e| {
                FetchError::Transfer(format!("cannot connect to {}:{}: {}", host, port, e))
            })?;
            let mut session = ssh2::Session::new().map_err(ssh_error)?;
            session.set_tcp_stream(tcp);
            session.handshake().map_err(ssh_error)?;
            Ok(session)
        })
        .await?;

        Ok(Box::new(Ssh2Session {
            session,
            closed: false,
        }))
    }
}

struct Ssh2Session {
    session: ssh2::Session,
    closed: bool,
}

#[async_trait]
impl TransferSession for Ssh2Session {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), FetchError> {
        let session = self.session.clone();
        let username = username.to_string();
        let password = password.to_string();
        blocking(move || {
            session
                .userauth_password(&username, &password)
                .map_err(|e| FetchError::Authentication(e.message().to_string()))?;
            if !session.authenticated() {
                return Err(FetchError::Authentication(
                    "server rejected username/password".to_string(),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, FetchError> {
        let session = self.session.clone();
        let path = PathBuf::from(path);
        blocking(move || {
            let sftp = session.sftp().map_err(ssh_error)?;
            let entries = sftp.readdir(&path).map_err(|e| {
                FetchError::Transfer(format!("cannot list {}: {}", path.display(), e.message()))
            })?;
            Ok(entries
                .into_iter()
                .filter_map(|(p, stat)| {
                    let name = p.file_name()?.to_string_lossy().to_string();
                    Some(RemoteEntry {
                        name,
                        is_dir: stat.is_dir(),
                    })
                })
                .filter(|e| e.name != "." && e.name != "..")
                .collect())
        })
        .await
    }

    async fn fetch(&mut self, remote_path: &str, local_path: &Path) -> Result<(), FetchError> {
        let session = self.session.clone();
        let remote = PathBuf::from(remote_path);
        let local = local_path.to_path_buf();
        blocking(move || {
            let sftp = session.sftp().map_err(ssh_error)?;
            let mut remote_file = sftp.open(&remote).map_err(|e| {
                FetchError::Transfer(format!("cannot open {}: {}", remote.display(), e.message()))
            })?;
            let mut contents = Vec::new();
            remote_file.read_to_end(&mut contents)?;
            std::fs::write(&local, contents)?;
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let session = self.session.clone();
        blocking(move || {
            session
                .disconnect(None, "closing", None)
                .map_err(ssh_error)
        })
        .await
    }
}

fn ssh_error(e: ssh2::Error) -> FetchError {
    FetchError::Transfer(e.message().to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FetchError::Transfer(format!("SFTP worker failed: {}", e)))?
}
