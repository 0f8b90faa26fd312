//! Filepath: src/remote/session.rs
//! Abstract protocol boundary: everything above this module depends only
//! on connect / list-with-type / ensure-dir / put-file / close, never on
//! a concrete FTP or SFTP client.

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// Failure kinds surfaced by the listing and transfer primitives.
/// Callers decide fall-through vs propagation per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    AccessDenied,
    NotFound,
    ProtocolUnsupported,
    Timeout,
    Connection,
    Other,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Connection, message)
    }
}

/// One directory entry as reported by the remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// An authenticated session on a remote server. Sessions are not shared
/// across threads; each upload worker owns its own.
pub trait RemoteSession: Send {
    /// List the immediate children of `path` with their type. `.` and
    /// `..` may or may not be present; callers must tolerate both.
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Make sure the single directory `path` exists, treating
    /// "already exists" as success.
    fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError>;

    /// Transfer one local file to the absolute remote path.
    fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    /// Best-effort orderly shutdown.
    fn close(&mut self);
}

/// Opens sessions for a configured remote target. Shared across upload
/// workers, each of which connects independently.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// Crawl progress, reported after every directory visit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanProgress {
    pub dirs_scanned: usize,
    pub files_found: usize,
}

/// Breadth-first crawl of the remote tree under `remote_base`, returning
/// the set of file paths relative to it (forward slashes, no leading
/// separator). One session serves the whole crawl; a directory whose
/// listing fails contributes nothing and the crawl continues.
pub fn list_remote(
    session: &mut dyn RemoteSession,
    remote_base: &str,
    mut progress: impl FnMut(ScanProgress),
) -> BTreeSet<String> {
    let remote_base = remote_base.trim_end_matches('/');
    let mut files = BTreeSet::new();
    let mut state = ScanProgress::default();

    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(remote_base.to_string());

    while let Some(dir) = queue.pop_front() {
        state.dirs_scanned += 1;

        let entries = match session.list_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir, kind = ?e.kind, error = %e, "remote listing failed, directory skipped");
                progress(state);
                continue;
            }
        };

        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let full = join_remote(&dir, &entry.name);
            if entry.is_dir {
                queue.push_back(full);
            } else if let Some(rel) = base_relative(&full, remote_base) {
                files.insert(rel);
                state.files_found += 1;
            }
        }

        progress(state);
    }

    files
}

/// Join a remote directory and a child name with a single separator.
/// Servers sometimes return absolute names from a listing; those pass
/// through untouched.
fn join_remote(dir: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else if dir.is_empty() || dir == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

/// Path of `full` relative to `base`, or `None` when it is `base` itself
/// (which contributes nothing to the file set).
fn base_relative(full: &str, base: &str) -> Option<String> {
    if full == base {
        return None;
    }
    let rel = full
        .strip_prefix(base)
        .map(|r| r.trim_start_matches('/'))
        .unwrap_or(full);
    if rel.is_empty() {
        None
    } else {
        Some(rel.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;

    /// In-memory remote tree for exercising the crawl without a server.
    #[derive(Default)]
    pub(crate) struct FakeSession {
        pub dirs: HashMap<String, Vec<RemoteEntry>>,
        pub failing: Vec<String>,
        pub ensured: Vec<String>,
        pub uploaded: Vec<(String, String)>,
    }

    impl FakeSession {
        pub fn dir(mut self, path: &str, entries: &[(&str, bool)]) -> Self {
            self.dirs.insert(
                path.to_string(),
                entries
                    .iter()
                    .map(|(n, d)| RemoteEntry { name: n.to_string(), is_dir: *d })
                    .collect(),
            );
            self
        }

        pub fn failing(mut self, path: &str) -> Self {
            self.failing.push(path.to_string());
            self
        }
    }

    impl RemoteSession for FakeSession {
        fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
            if self.failing.iter().any(|p| p == path) {
                return Err(RemoteError::new(
                    RemoteErrorKind::AccessDenied,
                    format!("permission denied: {path}"),
                ));
            }
            self.dirs
                .get(path)
                .cloned()
                .ok_or_else(|| RemoteError::new(RemoteErrorKind::NotFound, path))
        }

        fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError> {
            self.ensured.push(path.to_string());
            Ok(())
        }

        fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError> {
            self.uploaded
                .push((local.display().to_string(), remote.to_string()));
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn crawl_collects_base_relative_files_breadth_first() {
        let mut session = FakeSession::default()
            .dir(
                "/var/www",
                &[("index.html", false), ("assets", true), (".", true), ("..", true)],
            )
            .dir("/var/www/assets", &[("logo.png", false), ("css", true)])
            .dir("/var/www/assets/css", &[("site.css", false)]);

        let files = list_remote(&mut session, "/var/www/", |_| {});
        let expected: BTreeSet<String> = ["index.html", "assets/logo.png", "assets/css/site.css"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn failed_directory_is_skipped_not_fatal() {
        let mut session = FakeSession::default()
            .dir("/var/www", &[("public", true), ("private", true)])
            .dir("/var/www/public", &[("ok.txt", false)])
            .failing("/var/www/private");

        let files = list_remote(&mut session, "/var/www", |_| {});
        assert_eq!(files.len(), 1);
        assert!(files.contains("public/ok.txt"));
    }

    #[test]
    fn progress_reports_dirs_and_files() {
        let mut session = FakeSession::default()
            .dir("/base", &[("a.txt", false), ("sub", true)])
            .dir("/base/sub", &[("b.txt", false)]);

        let mut last = ScanProgress::default();
        list_remote(&mut session, "/base", |p| last = p);
        assert_eq!(last.dirs_scanned, 2);
        assert_eq!(last.files_found, 2);
    }

    #[test]
    fn entry_equal_to_base_contributes_nothing() {
        assert_eq!(base_relative("/base", "/base"), None);
        assert_eq!(base_relative("/base/a.txt", "/base").as_deref(), Some("a.txt"));
    }
}
