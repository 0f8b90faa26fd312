//! Filepath: src/core/upload.rs
//! Upload orchestrator: deterministic ordering, shared directory-creation
//! cache, bounded worker pool.
//!
//! Files transfer shallowest-first so parent content lands before deep
//! subtrees. Workers each own one protocol session, established lazily
//! and re-established after a failure; results stream back in completion
//! order. One failed file never aborts the batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::debug;

use crate::core::excludes::relative_slash_path;
use crate::remote::session::{RemoteConnector, RemoteSession};

/// Default number of concurrent upload workers.
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Result of one file transfer: the remote path on success, an error
/// description on failure.
#[derive(Debug)]
pub struct UploadOutcome {
    pub local: PathBuf,
    pub result: Result<String, String>,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub completed: usize,
    pub failed: usize,
}

/// Sort by (depth under `base` ascending, lowercased relative path
/// ascending); files outside `base` sort last.
pub fn sort_for_upload(mut files: Vec<PathBuf>, base: &Path) -> Vec<PathBuf> {
    files.sort_by_cached_key(|f| match relative_slash_path(f, base) {
        Some(rel) => (rel.matches('/').count(), rel.to_lowercase()),
        None => (usize::MAX, f.to_string_lossy().to_lowercase()),
    });
    files
}

/// Absolute remote path for `local`, or `None` when the file does not
/// resolve under the local base.
pub fn remote_file_path(local: &Path, base: &Path, remote_base: &str) -> Option<String> {
    let rel = relative_slash_path(local, base)?;
    Some(format!("{}/{rel}", remote_base.trim_end_matches('/')))
}

/// Upload `files` through a pool of `workers` sessions, invoking
/// `on_result` with each outcome and a running completed counter as
/// transfers finish.
pub fn upload(
    connector: &dyn RemoteConnector,
    files: Vec<PathBuf>,
    local_base: &Path,
    remote_base: &str,
    workers: usize,
    mut on_result: impl FnMut(&UploadOutcome, usize, usize),
) -> UploadReport {
    let files = sort_for_upload(files, local_base);
    let total = files.len();
    if total == 0 {
        return UploadReport::default();
    }
    let workers = workers.max(1).min(total);

    // The only state shared between workers: remote directories already
    // confirmed or created. Check and insert happen under one lock so
    // concurrent uploads into the same directory do not race mkdir.
    let created_dirs: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

    let (job_tx, job_rx) = bounded::<PathBuf>(workers * 2);
    let (result_tx, result_rx) = unbounded::<UploadOutcome>();

    let mut report = UploadReport::default();

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let created_dirs = &created_dirs;
            scope.spawn(move || {
                let mut session: Option<Box<dyn RemoteSession>> = None;
                while let Ok(file) = job_rx.recv() {
                    let outcome = upload_one(
                        connector,
                        &mut session,
                        created_dirs,
                        &file,
                        local_base,
                        remote_base,
                    );
                    if outcome.result.is_err() {
                        // Drop the session so the next job reconnects.
                        if let Some(mut s) = session.take() {
                            s.close();
                        }
                    }
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                if let Some(mut s) = session.take() {
                    s.close();
                }
            });
        }
        drop(result_tx);
        drop(job_rx);

        scope.spawn(move || {
            for file in files {
                if job_tx.send(file).is_err() {
                    break;
                }
            }
        });

        for outcome in result_rx.iter() {
            report.completed += 1;
            if outcome.result.is_err() {
                report.failed += 1;
            }
            on_result(&outcome, report.completed, total);
        }
    });

    report
}

fn upload_one(
    connector: &dyn RemoteConnector,
    session: &mut Option<Box<dyn RemoteSession>>,
    created_dirs: &Mutex<HashSet<String>>,
    file: &Path,
    local_base: &Path,
    remote_base: &str,
) -> UploadOutcome {
    let Some(remote) = remote_file_path(file, local_base, remote_base) else {
        return UploadOutcome {
            local: file.to_path_buf(),
            result: Err(format!(
                "not within local base path {}",
                local_base.display()
            )),
        };
    };

    if session.is_none() {
        match connector.connect() {
            Ok(s) => *session = Some(s),
            Err(e) => {
                return UploadOutcome {
                    local: file.to_path_buf(),
                    result: Err(e.to_string()),
                };
            }
        }
    }
    let Some(session) = session else {
        return UploadOutcome {
            local: file.to_path_buf(),
            result: Err("no session available".to_string()),
        };
    };

    if let Some(parent) = remote.rfind('/').map(|i| &remote[..i]) {
        if !parent.is_empty() {
            ensure_remote_dirs(&mut **session, created_dirs, parent);
        }
    }

    let result = session
        .put_file(file, &remote)
        .map(|()| remote)
        .map_err(|e| e.to_string());
    UploadOutcome { local: file.to_path_buf(), result }
}

/// Ensure every segment of `remote_dir` exists, consulting and updating
/// the shared cache. The lock spans the whole sequence so each directory
/// is probed at most once across the pool.
fn ensure_remote_dirs(
    session: &mut dyn RemoteSession,
    created_dirs: &Mutex<HashSet<String>>,
    remote_dir: &str,
) {
    let mut cache = created_dirs
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if cache.contains(remote_dir) {
        return;
    }

    let absolute = remote_dir.starts_with('/');
    let mut current = String::new();
    for segment in remote_dir.split('/').filter(|s| !s.is_empty()) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        if cache.contains(&current) {
            continue;
        }
        match session.ensure_dir(&current) {
            Ok(()) => {
                cache.insert(current.clone());
            }
            Err(e) => debug!(dir = %current, error = %e, "ensure_dir failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::remote::session::tests::FakeSession;
    use crate::remote::session::{RemoteEntry, RemoteError, RemoteErrorKind};

    #[test]
    fn sorts_by_depth_then_case_insensitive_name() {
        let base = Path::new("/base");
        let files = vec![
            PathBuf::from("/base/a/b/deep.txt"),
            PathBuf::from("/base/Zz.txt"),
            PathBuf::from("/base/aa.txt"),
            PathBuf::from("/base/mid/file.txt"),
            PathBuf::from("/elsewhere/out.txt"),
        ];
        let sorted = sort_for_upload(files, base);
        assert_eq!(
            sorted,
            vec![
                PathBuf::from("/base/aa.txt"),
                PathBuf::from("/base/Zz.txt"),
                PathBuf::from("/base/mid/file.txt"),
                PathBuf::from("/base/a/b/deep.txt"),
                PathBuf::from("/elsewhere/out.txt"),
            ]
        );
    }

    #[test]
    fn remote_path_joins_base_and_relative() {
        let remote = remote_file_path(
            Path::new("/base/sub/a.txt"),
            Path::new("/base"),
            "/var/www/",
        );
        assert_eq!(remote.as_deref(), Some("/var/www/sub/a.txt"));
        assert!(remote_file_path(Path::new("/other/a.txt"), Path::new("/base"), "/www").is_none());
    }

    #[test]
    fn ensure_dirs_probes_each_segment_once() {
        let mut session = FakeSession::default();
        let cache = Mutex::new(HashSet::new());

        ensure_remote_dirs(&mut session, &cache, "/var/www/assets");
        ensure_remote_dirs(&mut session, &cache, "/var/www/assets");
        ensure_remote_dirs(&mut session, &cache, "/var/www/js");

        assert_eq!(
            session.ensured,
            vec!["/var", "/var/www", "/var/www/assets", "/var/www/js"]
        );
    }

    #[test]
    fn relative_remote_base_builds_relative_segments() {
        let mut session = FakeSession::default();
        let cache = Mutex::new(HashSet::new());
        ensure_remote_dirs(&mut session, &cache, "htdocs/css");
        assert_eq!(session.ensured, vec!["htdocs", "htdocs/css"]);
    }

    /// Connector whose sessions record uploads into shared state and
    /// fail on selected remote paths.
    struct RecordingConnector {
        uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
        fail_on: Vec<String>,
    }

    struct RecordingSession {
        uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
        fail_on: Vec<String>,
    }

    impl RemoteConnector for RecordingConnector {
        fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
            Ok(Box::new(RecordingSession {
                uploads: Arc::clone(&self.uploads),
                fail_on: self.fail_on.clone(),
            }))
        }
    }

    impl RemoteSession for RecordingSession {
        fn list_dir(&mut self, _path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
            Ok(Vec::new())
        }

        fn ensure_dir(&mut self, _path: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), RemoteError> {
            if self.fail_on.iter().any(|f| f == remote) {
                return Err(RemoteError::new(RemoteErrorKind::AccessDenied, "denied"));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((local.to_path_buf(), remote.to_string()));
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn one_failure_does_not_abort_the_batch() {
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let connector = RecordingConnector {
            uploads: Arc::clone(&uploads),
            fail_on: vec!["/www/bad.txt".to_string()],
        };
        let files = vec![
            PathBuf::from("/base/good.txt"),
            PathBuf::from("/base/bad.txt"),
            PathBuf::from("/base/also.txt"),
        ];

        let mut counters = Vec::new();
        let report = upload(
            &connector,
            files,
            Path::new("/base"),
            "/www",
            2,
            |_outcome, completed, total| counters.push((completed, total)),
        );

        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(counters.last(), Some(&(3, 3)));
        assert_eq!(uploads.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let connector = RecordingConnector {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail_on: Vec::new(),
        };
        let report = upload(&connector, Vec::new(), Path::new("/b"), "/r", 4, |_, _, _| {});
        assert_eq!(report.completed, 0);
    }
}
