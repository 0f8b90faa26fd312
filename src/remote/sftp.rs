//! Filepath: src/remote/sftp.rs
//! SFTP implementation of the session traits, backed by ssh2.

use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use ssh2::{ErrorCode, Session, Sftp};

use crate::remote::session::{
    RemoteConnector, RemoteEntry, RemoteError, RemoteErrorKind, RemoteSession,
};

// libssh2 status codes used for error mapping.
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_PERMISSION_DENIED: i32 = 3;
const SESSION_TIMEOUT: i32 = -9;

const OP_TIMEOUT_MS: u32 = 60_000;
const DIR_MODE: i32 = 0o755;

/// Connection parameters for one SFTP target. Authentication order:
/// key file (password doubles as the passphrase), then password, then
/// the running SSH agent.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
}

impl RemoteConnector for SftpConnector {
    fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let tcp = TcpStream::connect((self.hostname.as_str(), self.port)).map_err(|e| {
            RemoteError::connection(format!(
                "TCP connect to {}:{} failed: {e}",
                self.hostname, self.port
            ))
        })?;

        let mut session = Session::new()
            .map_err(|e| RemoteError::connection(format!("SSH session init failed: {e}")))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(OP_TIMEOUT_MS);
        session
            .handshake()
            .map_err(|e| RemoteError::connection(format!("SSH handshake failed: {e}")))?;

        if let Some(key) = &self.key_file {
            session
                .userauth_pubkey_file(&self.username, None, key, self.password.as_deref())
                .map_err(|e| {
                    RemoteError::connection(format!("public key authentication failed: {e}"))
                })?;
        } else if let Some(password) = &self.password {
            session
                .userauth_password(&self.username, password)
                .map_err(|e| {
                    RemoteError::connection(format!("password authentication failed: {e}"))
                })?;
        } else {
            session.userauth_agent(&self.username).map_err(|e| {
                RemoteError::connection(format!("SSH agent authentication failed: {e}"))
            })?;
        }

        if !session.authenticated() {
            return Err(RemoteError::connection("SSH authentication incomplete"));
        }

        let sftp = session
            .sftp()
            .map_err(|e| RemoteError::connection(format!("opening SFTP channel failed: {e}")))?;
        Ok(Box::new(SftpSession { session, sftp }))
    }
}

pub struct SftpSession {
    session: Session,
    sftp: Sftp,
}

impl RemoteSession for SftpSession {
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let entries = self
            .sftp
            .readdir(Path::new(path))
            .map_err(map_ssh_error)?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(RemoteEntry { name, is_dir: stat.is_dir() })
            })
            .collect())
    }

    fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        if self.sftp.stat(Path::new(path)).is_ok() {
            return Ok(());
        }
        // A failure here is either a concurrent creation or a real
        // problem the transfer itself will report.
        let _ = self.sftp.mkdir(Path::new(path), DIR_MODE);
        Ok(())
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let mut src = File::open(local).map_err(|e| {
            RemoteError::new(
                RemoteErrorKind::Other,
                format!("cannot open {}: {e}", local.display()),
            )
        })?;
        let mut dst = self
            .sftp
            .create(Path::new(remote))
            .map_err(map_ssh_error)?;
        io::copy(&mut src, &mut dst).map_err(|e| {
            RemoteError::new(
                RemoteErrorKind::Other,
                format!("write to {remote} failed: {e}"),
            )
        })?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.session.disconnect(None, "done", None);
    }
}

fn map_ssh_error(e: ssh2::Error) -> RemoteError {
    let kind = match e.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => RemoteErrorKind::NotFound,
        ErrorCode::SFTP(SFTP_PERMISSION_DENIED) => RemoteErrorKind::AccessDenied,
        ErrorCode::Session(SESSION_TIMEOUT) => RemoteErrorKind::Timeout,
        _ => RemoteErrorKind::Other,
    };
    RemoteError::new(kind, e.to_string())
}
