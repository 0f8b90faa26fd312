//! Filepath: src/cli.rs
//! Command-line surface. Subcommand-free: positional patterns plus flags
//! selecting the binding, the visual-check mode and the transfer knobs.

use clap::Parser;

use crate::core::tree::DEFAULT_MAX_DEPTH;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // --quiet
    pub no_color: bool, // --no-color
}

impl AppContext {
    pub fn color(&self) -> bool {
        !self.no_color
    }
}

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Upload files and directories to a remote FTP/SFTP server")]
#[command(version, long_about = LONG_ABOUT)]
pub struct Cli {
    /// File names, glob patterns (quote them!) or directories to upload
    #[arg(value_name = "PATTERNS")]
    pub patterns: Vec<String>,

    /// Binding alias from configuration; auto-detected from the current
    /// directory when omitted
    #[arg(short = 'b', long = "binding", value_name = "ALIAS")]
    pub binding: Option<String>,

    /// Search recursively for bare-name patterns [default: enabled]
    #[arg(short = 'r', long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Disable the recursive search for bare-name patterns
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,

    /// Show the tree comparison with changes only (new and overwritten
    /// files, remote-only hidden)
    #[arg(long, visible_alias = "vc")]
    pub visual_check: bool,

    /// Disable the complete tree comparison shown before upload
    /// [default: enabled]
    #[arg(long, visible_alias = "nvcc")]
    pub no_visual_check_complete: bool,

    /// Maximum tree depth to display in the visual check
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH, value_name = "DEPTH")]
    pub max_depth: usize,

    /// Show summary statistics only, skip the tree display
    #[arg(long, visible_alias = "ts")]
    pub tree_summary: bool,

    /// Upload without confirmation or remote file check (fastest mode)
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Display the merged configuration with source annotations and exit
    #[arg(long)]
    pub show_config: bool,

    /// List files and directories ignored by exclude patterns and exit
    #[arg(long)]
    pub show_ignored: bool,

    /// Number of parallel upload workers (overrides the binding setting)
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Use FTP active mode instead of passive (PASV)
    #[arg(long)]
    pub ftp_active: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Suppress progress display and non-essential output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Cli {
    pub fn recursive(&self) -> bool {
        !self.no_recursive
    }

    pub fn visual_check_complete(&self) -> bool {
        !self.no_visual_check_complete
    }

    pub fn context(&self) -> AppContext {
        AppContext { quiet: self.quiet, no_color: self.no_color }
    }
}

const LONG_ABOUT: &str = "\
Upload files matching PATTERNS to a remote FTP/SFTP server.

The remote path of each file is its path relative to the binding's
local_basepath, appended to remote_basepath. Bindings live in .skiff.json
files discovered from the filesystem root down to the current directory,
on top of an optional user-level config (~/.skiff/skiff.json or
~/.config/skiff/skiff.json).

PATTERNS can be specific file names, quoted glob patterns (\"*.css\",
\"src/**/*.js\") or directories. Always quote glob patterns: the shell
expands them before this program runs.";
