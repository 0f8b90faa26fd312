//! Filepath: src/remote/ftp.rs
//! FTP implementation of the session traits, backed by suppaftp.
//!
//! Listing prefers LIST with parsed attributes; servers whose LIST output
//! cannot be parsed fall back to NLST plus a change-directory probe per
//! entry. All remote paths are absolute, so the server-side working
//! directory is never relied on between operations.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode};
use tracing::debug;

use crate::remote::session::{
    RemoteConnector, RemoteEntry, RemoteError, RemoteErrorKind, RemoteSession,
};

/// Connection parameters for one FTP target.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Passive unless the operator forces active mode.
    pub passive: bool,
}

impl RemoteConnector for FtpConnector {
    fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut stream = FtpStream::connect((self.hostname.as_str(), self.port))
            .map_err(|e| RemoteError::connection(format!(
                "FTP connect to {}:{} failed: {e}",
                self.hostname, self.port
            )))?;
        stream
            .login(&self.username, &self.password)
            .map_err(|e| RemoteError::connection(format!("FTP login failed: {e}")))?;
        stream.set_mode(if self.passive { Mode::Passive } else { Mode::Active });
        stream
            .transfer_type(FileType::Binary)
            .map_err(map_ftp_error)?;
        Ok(Box::new(FtpSession { stream }))
    }
}

pub struct FtpSession {
    stream: FtpStream,
}

impl FtpSession {
    /// NLST fallback: names only, directory-ness inferred by attempting
    /// to change into each entry.
    fn list_by_probe(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let names = self.stream.nlst(Some(path)).map_err(map_ftp_error)?;
        let cwd_before = self.stream.pwd().map_err(map_ftp_error)?;

        let mut entries = Vec::with_capacity(names.len());
        for full in names {
            let name = full.rsplit('/').next().unwrap_or(&full).to_string();
            if name == "." || name == ".." {
                continue;
            }
            let probe = if full.starts_with('/') {
                full.clone()
            } else {
                format!("{}/{name}", path.trim_end_matches('/'))
            };
            let is_dir = self.stream.cwd(&probe).is_ok();
            if is_dir {
                self.stream.cwd(&cwd_before).map_err(map_ftp_error)?;
            }
            entries.push(RemoteEntry { name, is_dir });
        }
        Ok(entries)
    }
}

impl RemoteSession for FtpSession {
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        match self.stream.list(Some(path)) {
            Ok(lines) => {
                let mut entries = Vec::with_capacity(lines.len());
                let mut parsed = true;
                for line in &lines {
                    match suppaftp::list::File::try_from(line.as_str()) {
                        Ok(file) => entries.push(RemoteEntry {
                            name: file.name().to_string(),
                            is_dir: file.is_directory(),
                        }),
                        Err(e) => {
                            debug!(line = %line, error = %e, "unparseable LIST line, probing with NLST");
                            parsed = false;
                            break;
                        }
                    }
                }
                if parsed {
                    return Ok(entries);
                }
            }
            Err(e) => {
                debug!(path = %path, error = %e, "LIST failed, probing with NLST");
            }
        }
        self.list_by_probe(path)
    }

    fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        if self.stream.cwd(path).is_ok() {
            return Ok(());
        }
        if let Err(e) = self.stream.mkdir(path) {
            // Concurrent creation or a pre-existing directory both land
            // here; the subsequent transfer surfaces real failures.
            debug!(path = %path, error = %e, "mkdir refused");
        }
        Ok(())
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let mut file = File::open(local).map_err(|e| {
            RemoteError::new(
                RemoteErrorKind::Other,
                format!("cannot open {}: {e}", local.display()),
            )
        })?;
        self.stream
            .put_file(remote, &mut file)
            .map_err(map_ftp_error)?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.quit();
    }
}

fn map_ftp_error(e: FtpError) -> RemoteError {
    let kind = match &e {
        FtpError::ConnectionError(io) => match io.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => RemoteErrorKind::Timeout,
            _ => RemoteErrorKind::Connection,
        },
        FtpError::UnexpectedResponse(_) => RemoteErrorKind::Other,
        _ => RemoteErrorKind::Other,
    };
    RemoteError::new(kind, e.to_string())
}
