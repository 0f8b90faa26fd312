//! Filepath: src/core/tree.rs
//! Pre-upload "visual check": set diff between the local and remote file
//! trees, rendered as a nested tree with box-drawing connectors.
//!
//! Uses BTreeMap for deterministic ordering; directories render before
//! files at every level. Beyond the depth limit the renderer reports the
//! number of hidden files instead of descending further.

use std::collections::{BTreeMap, BTreeSet};

use owo_colors::OwoColorize;

/// Default maximum tree depth for the rendered comparison.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Classification of a file in the local/remote comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Overwrite,
    RemoteOnly,
}

impl FileStatus {
    fn tag(self) -> &'static str {
        match self {
            Self::New => "[NEW]",
            Self::Overwrite => "[OVERWRITE]",
            Self::RemoteOnly => "[REMOTE ONLY]",
        }
    }

    fn colored_tag(self) -> String {
        match self {
            Self::New => self.tag().green().bold().to_string(),
            Self::Overwrite => self.tag().yellow().bold().to_string(),
            Self::RemoteOnly => self.tag().blue().dimmed().to_string(),
        }
    }
}

/// Result of diffing the local file set against the remote file set.
/// `remote_only` is populated only for the complete view; the summary
/// falls back to `remote_total - overwrite` otherwise.
#[derive(Debug)]
pub struct TreeDiff {
    pub new: BTreeSet<String>,
    pub overwrite: BTreeSet<String>,
    pub remote_only: BTreeSet<String>,
    pub remote_total: usize,
    pub complete: bool,
}

impl TreeDiff {
    /// `new = local - remote`, `overwrite = local ∩ remote`,
    /// `remote_only = remote - local` (complete view only).
    pub fn compute(
        local: &BTreeSet<String>,
        remote: &BTreeSet<String>,
        complete: bool,
    ) -> Self {
        let new = local.difference(remote).cloned().collect();
        let overwrite = local.intersection(remote).cloned().collect();
        let remote_only = if complete {
            remote.difference(local).cloned().collect()
        } else {
            BTreeSet::new()
        };
        Self {
            new,
            overwrite,
            remote_only,
            remote_total: remote.len(),
            complete,
        }
    }

    pub fn remote_only_count(&self) -> usize {
        if self.complete {
            self.remote_only.len()
        } else {
            self.remote_total - self.overwrite.len()
        }
    }
}

/// A directory level of the comparison tree. Subdirectories and files are
/// kept apart so directories always render first.
#[derive(Debug, Default)]
pub struct TreeNode {
    dirs: BTreeMap<String, TreeNode>,
    files: BTreeMap<String, FileStatus>,
}

impl TreeNode {
    /// Build the nested tree from the three classified path sets.
    pub fn from_diff(diff: &TreeDiff) -> Self {
        let mut root = Self::default();
        for path in &diff.new {
            root.insert(path, FileStatus::New);
        }
        for path in &diff.overwrite {
            root.insert(path, FileStatus::Overwrite);
        }
        for path in &diff.remote_only {
            root.insert(path, FileStatus::RemoteOnly);
        }
        root
    }

    fn insert(&mut self, rel_path: &str, status: FileStatus) {
        let mut node = self;
        let mut parts = rel_path.split('/').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.files.insert(part.to_string(), status);
            } else {
                node = node.dirs.entry(part.to_string()).or_default();
            }
        }
    }

    /// Render into `out`, one line per entry, returning the number of
    /// files hidden beyond `max_depth`.
    pub fn render(&self, max_depth: usize, color: bool, out: &mut Vec<String>) -> usize {
        self.render_level(max_depth, color, "", 0, out)
    }

    fn render_level(
        &self,
        max_depth: usize,
        color: bool,
        prefix: &str,
        depth: usize,
        out: &mut Vec<String>,
    ) -> usize {
        if depth > max_depth {
            return self.file_count();
        }

        let mut hidden = 0usize;
        let total = self.dirs.len() + self.files.len();
        let mut index = 0usize;

        for (name, child) in &self.dirs {
            index += 1;
            let last = index == total;
            let connector = if last { "└── " } else { "├── " };
            out.push(format!("{prefix}{connector}{name}/"));

            let extension = if last { "    " } else { "│   " };
            hidden += child.render_level(
                max_depth,
                color,
                &format!("{prefix}{extension}"),
                depth + 1,
                out,
            );
        }

        for (name, status) in &self.files {
            index += 1;
            let connector = if index == total { "└── " } else { "├── " };
            let tag = if color {
                status.colored_tag()
            } else {
                status.tag().to_string()
            };
            out.push(format!("{prefix}{connector}{name} {tag}"));
        }

        hidden
    }

    /// Total files in this subtree.
    fn file_count(&self) -> usize {
        self.files.len()
            + self.dirs.values().map(TreeNode::file_count).sum::<usize>()
    }
}
