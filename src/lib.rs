//! **skiff** - upload local files to remote FTP/SFTP servers
//!
//! Hierarchical JSON configuration, gitignore-style exclude patterns and a
//! pre-upload tree diff against the remote file tree, gated by an explicit
//! confirmation before anything is transferred.

/// Command-line interface with clap integration
pub mod cli;

/// End-to-end flow control behind the CLI
pub mod app;

/// Core pipeline - pattern matching, walking, diffing, uploading
pub mod core {
    /// Exclude patterns and per-directory ignore files
    pub mod excludes;
    pub use excludes::{collect_ignore_patterns, ExcludePattern, ExcludeSet};

    /// Local tree diffed against the remote tree, rendered before upload
    pub mod tree;
    pub use tree::{FileStatus, TreeDiff, TreeNode};

    /// Worker pool transferring files through per-worker sessions
    pub mod upload;
    pub use upload::{sort_for_upload, upload, UploadOutcome, UploadReport};

    /// CLI pattern expansion into the deduplicated local file list
    pub mod walk;
    pub use walk::{expand_patterns, walk_directory, ExpandResult};
}

/// Remote protocol boundary - one trait, two transports
pub mod remote {
    /// Session traits, error taxonomy and the breadth-first tree lister
    pub mod session;
    pub use session::{
        list_remote, RemoteConnector, RemoteEntry, RemoteError, RemoteErrorKind,
        RemoteSession, ScanProgress,
    };

    /// FTP transport (suppaftp)
    pub mod ftp;
    pub use ftp::FtpConnector;

    /// SFTP transport (ssh2)
    pub mod sftp;
    pub use sftp::SftpConnector;
}

/// Infrastructure - configuration and terminal helpers
pub mod infra {
    /// Hierarchical JSON config discovery and merging
    pub mod config;
    pub use config::{Binding, Config, ConfigError, Protocol, TieBreak};

    /// Confirmation prompt and elapsed-time formatting
    pub mod term;
}

// Strategic re-exports for library consumers
pub use self::core::{ExcludeSet, TreeDiff, TreeNode};
pub use cli::{AppContext, Cli};
pub use infra::{Binding, Config, ConfigError, Protocol};
pub use remote::{RemoteConnector, RemoteSession};
