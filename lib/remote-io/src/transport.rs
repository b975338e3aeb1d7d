use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("sftp unavailable: {0}")]
    SftpUnavailable(String),
    #[error("ssh unavailable: {0}")]
    SshUnavailable(String),
    #[error("remote agent exited with code {code}: {stderr}")]
    AgentExited { code: i32, stderr: String },
    #[error("remote operation timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileStat {
    /// Modify time in milliseconds since the epoch.
    pub mtime_ms: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// File transfer plus remote shell, the two suspension points of the
/// ingestion pipeline. Tests substitute an in-memory implementation.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    async fn stat(&self, path: &str) -> Result<Option<RemoteFileStat>, TransportError>;
    async fn download(&self, path: &str) -> Result<Vec<u8>, TransportError>;
    async fn upload(&self, path: &str, data: &[u8]) -> Result<(), TransportError>;
    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError>;

    /// Cheap reachability probe.
    async fn available(&self) -> bool {
        self.stat("/").await.is_ok()
    }
}

/// Connection settings for [`SftpTransport`].
#[derive(Debug, Clone)]
pub struct SftpOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Private key file, used instead of the password when set.
    pub key_path: String,
    /// Upper bound for one remote command execution.
    pub exec_timeout: Duration,
}

impl Default for SftpOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            password: String::new(),
            key_path: String::new(),
            exec_timeout: Duration::from_secs(120),
        }
    }
}

/// libssh2-backed transport. The library is synchronous, so every operation
/// runs on the blocking pool; `exec` is additionally bounded by the
/// configured timeout.
pub struct SftpTransport {
    cfg: Arc<SftpOptions>,
}

impl SftpTransport {
    pub fn new(cfg: SftpOptions) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    fn session(cfg: &SftpOptions) -> Result<ssh2::Session, TransportError> {
        let stream = TcpStream::connect((cfg.host.as_str(), cfg.port))
            .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .ok();
        let mut session =
            ssh2::Session::new().map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
        session.set_tcp_stream(stream);
        session
            .handshake()
            .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
        if !cfg.key_path.is_empty() {
            session
                .userauth_pubkey_file(&cfg.user, None, Path::new(&cfg.key_path), None)
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
        } else {
            session
                .userauth_password(&cfg.user, &cfg.password)
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
        }
        Ok(session)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&SftpOptions) -> Result<T, TransportError> + Send + 'static,
    {
        let cfg = self.cfg.clone();
        tokio::task::spawn_blocking(move || op(&cfg))
            .await
            .map_err(|err| TransportError::SshUnavailable(err.to_string()))?
    }
}

#[async_trait]
impl RemoteTransport for SftpTransport {
    async fn stat(&self, path: &str) -> Result<Option<RemoteFileStat>, TransportError> {
        let path = path.to_string();
        self.blocking(move |cfg| {
            let session = Self::session(cfg)?;
            let sftp = session
                .sftp()
                .map_err(|err| TransportError::SftpUnavailable(err.to_string()))?;
            match sftp.stat(Path::new(&path)) {
                Ok(stat) => Ok(Some(RemoteFileStat {
                    mtime_ms: stat.mtime.unwrap_or(0) as i64 * 1000,
                    size: stat.size.unwrap_or(0),
                })),
                Err(err) if err.code() == ssh2::ErrorCode::SFTP(2) => Ok(None),
                Err(err) => Err(TransportError::SftpUnavailable(err.to_string())),
            }
        })
        .await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let path = path.to_string();
        self.blocking(move |cfg| {
            let session = Self::session(cfg)?;
            let sftp = session
                .sftp()
                .map_err(|err| TransportError::SftpUnavailable(err.to_string()))?;
            let mut file = sftp
                .open(Path::new(&path))
                .map_err(|err| TransportError::SftpUnavailable(err.to_string()))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            Ok(data)
        })
        .await
    }

    async fn upload(&self, path: &str, data: &[u8]) -> Result<(), TransportError> {
        let path = path.to_string();
        let data = data.to_vec();
        self.blocking(move |cfg| {
            let session = Self::session(cfg)?;
            let sftp = session
                .sftp()
                .map_err(|err| TransportError::SftpUnavailable(err.to_string()))?;
            let mut file = sftp
                .create(Path::new(&path))
                .map_err(|err| TransportError::SftpUnavailable(err.to_string()))?;
            file.write_all(&data)?;
            Ok(())
        })
        .await
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError> {
        let command = command.to_string();
        let timeout = self.cfg.exec_timeout;
        let fut = self.blocking(move |cfg| {
            let session = Self::session(cfg)?;
            let mut channel = session
                .channel_session()
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
            channel
                .exec(&command)
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
            let mut stdout = String::new();
            channel.read_to_string(&mut stdout)?;
            let mut stderr = String::new();
            channel.stderr().read_to_string(&mut stderr)?;
            channel
                .wait_close()
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
            let code = channel
                .exit_status()
                .map_err(|err| TransportError::SshUnavailable(err.to_string()))?;
            Ok(ExecOutput {
                code,
                stdout,
                stderr,
            })
        });
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn available(&self) -> bool {
        self.blocking(|cfg| Self::session(cfg).map(|_| ())).await.is_ok()
    }
}
