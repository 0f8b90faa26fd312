//! Filepath: src/core/excludes.rs
//! Exclude-pattern matching and per-directory ignore files.
//!
//! Pattern semantics follow the gitignore family:
//! - `*.log`, `node_modules` — bare names, match anywhere under the base
//! - `src/tmp`, `/build` — contain a separator, anchored to the base
//!   directory (leading slash optional, `**` crosses segments)
//! - trailing `/` restricts a pattern to directories
//!
//! Backed by `globset`; a pattern that fails to compile degrades to a
//! literal comparison instead of aborting the walk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

/// Name of the per-directory ignore file.
pub const IGNORE_FILE_NAME: &str = ".skiffignore";

/// A single parsed exclude pattern.
#[derive(Debug)]
pub struct ExcludePattern {
    raw: String,
    /// Trailing `/` in the raw token: only directories can match.
    dir_only: bool,
    /// Contains a separator: rooted to the base directory.
    anchored: bool,
    /// Compiled matcher; `None` when the glob syntax was malformed.
    matcher: Option<GlobMatcher>,
    /// Literal form used both as compile input and as the fallback
    /// comparison target for malformed globs. Anchored patterns carry
    /// a single leading `/`.
    token: String,
}

impl ExcludePattern {
    pub fn parse(raw: &str) -> Self {
        let mut token = raw.to_string();
        let dir_only = token.ends_with('/') && token.len() > 1;
        if dir_only {
            token.pop();
        }

        let anchored = token.contains('/');
        if anchored {
            // "/src/foo" and "src/foo" anchor identically.
            let stripped = token.trim_start_matches('/');
            token = format!("/{stripped}");
        }

        let matcher = GlobBuilder::new(&token)
            // Anchored patterns match whole rooted paths: `*`/`?` stay
            // within a segment, `**` crosses segments.
            .literal_separator(anchored)
            .build()
            .map(|g| g.compile_matcher())
            .map_err(|e| {
                debug!(pattern = raw, error = %e, "malformed exclude pattern, using literal match");
                e
            })
            .ok();

        Self { raw: raw.to_string(), dir_only, anchored, matcher, token }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn anchored(&self) -> bool {
        self.anchored
    }

    pub fn dir_only(&self) -> bool {
        self.dir_only
    }

    /// Match against a candidate. `name` is the bare file name, `rooted`
    /// the base-relative path with a single leading `/`.
    fn matches(&self, name: &str, rooted: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }

        let candidate = if self.anchored { rooted } else { name };
        match &self.matcher {
            Some(m) => m.is_match(candidate),
            None => self.token == candidate,
        }
    }
}

/// An ordered set of exclude patterns sharing one base directory scope.
/// First matching pattern wins; with no patterns nothing is excluded.
#[derive(Debug, Default)]
pub struct ExcludeSet {
    patterns: Vec<ExcludePattern>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self {
            patterns: tokens
                .iter()
                .map(|t| ExcludePattern::parse(t.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// A new set with `extra` tokens appended after the existing patterns.
    pub fn extended<S: AsRef<str>>(&self, extra: &[S]) -> Self {
        let mut patterns: Vec<ExcludePattern> = self
            .patterns
            .iter()
            .map(|p| ExcludePattern::parse(p.raw()))
            .collect();
        patterns.extend(extra.iter().map(|t| ExcludePattern::parse(t.as_ref())));
        Self { patterns }
    }

    /// Whether `path` is excluded relative to `base`. Paths that do not
    /// resolve under `base` cannot be excluded by base-relative rules.
    pub fn is_excluded(&self, path: &Path, base: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let Some(rel) = relative_slash_path(path, base) else {
            return false;
        };
        self.matches_rel(&rel, path.is_dir())
    }

    /// Pure form of the match: `rel` is a base-relative slash path.
    pub fn matches_rel(&self, rel: &str, is_dir: bool) -> bool {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        let rooted = format!("/{rel}");
        self.patterns.iter().any(|p| p.matches(name, &rooted, is_dir))
    }
}

/// Compute `path` relative to `base` as a forward-slash string, or `None`
/// when `path` is not a descendant of `base`. Falls back to canonicalized
/// forms so `./x` and symlinked bases still resolve.
pub fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = match path.strip_prefix(base) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => {
            let path = dunce::canonicalize(path).ok()?;
            let base = dunce::canonicalize(base).ok()?;
            path.strip_prefix(&base).ok()?.to_path_buf()
        }
    };

    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Read patterns from one ignore file: non-empty, non-`#` lines.
/// Missing or unreadable files yield no patterns.
pub fn load_ignore_file(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Patterns from one directory's ignore file, re-anchored to the
/// directory's position relative to `base`.
pub fn dir_ignore_patterns(dir: &Path, base: &Path) -> Vec<String> {
    let raw = load_ignore_file(&dir.join(IGNORE_FILE_NAME));
    if raw.is_empty() {
        return raw;
    }
    let rel_dir = relative_slash_path(dir, base).unwrap_or_default();
    raw.into_iter().map(|p| anchor_pattern(p, &rel_dir)).collect()
}

/// Collect ignore-file patterns walking from `start_dir` up to `base`
/// (both inclusive). Patterns with a separator are re-anchored to the
/// visited directory's position relative to `base`; name-only patterns
/// pass through unchanged. All patterns accumulate additively.
pub fn collect_ignore_patterns(start_dir: &Path, base: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let canon_base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
    let mut current = start_dir.to_path_buf();

    loop {
        out.extend(dir_ignore_patterns(&current, base));

        let canon_current =
            dunce::canonicalize(&current).unwrap_or_else(|_| current.clone());
        if canon_current == canon_base {
            break;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    out
}

/// Rewrite one raw ignore-file pattern found in a directory located at
/// `rel_dir` (slash path, "" for the base itself) under the base.
fn anchor_pattern(pattern: String, rel_dir: &str) -> String {
    // Only separator-bearing patterns anchor; ignore one trailing slash
    // when testing, but keep it in the output.
    if !pattern.trim_end_matches('/').contains('/') {
        return pattern;
    }
    let clean = pattern.trim_start_matches('/');
    if rel_dir.is_empty() {
        format!("/{clean}")
    } else {
        format!("/{rel_dir}/{clean}")
    }
}

/// One entry reported by the ignored-files scan.
#[derive(Debug)]
pub struct IgnoredItem {
    pub rel_path: String,
    pub is_dir: bool,
    pub depth: usize,
}

/// Scan `base` for entries the exclude set rejects. Excluded directories
/// are recorded but never descended into; the second value is the number
/// of entries examined.
pub fn scan_ignored(
    base: &Path,
    excludes: &ExcludeSet,
    recursive: bool,
) -> (Vec<IgnoredItem>, usize) {
    let mut items = Vec::new();
    let mut scanned = 0usize;
    let mut stack: Vec<(PathBuf, usize)> = vec![(base.to_path_buf(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let mut entries: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        // Reverse so the stack pops in sorted order.
        for entry in entries.into_iter().rev() {
            scanned += 1;
            if excludes.is_excluded(&entry, base) {
                if let Some(rel) = relative_slash_path(&entry, base) {
                    items.push(IgnoredItem {
                        rel_path: rel,
                        is_dir: entry.is_dir(),
                        depth,
                    });
                }
                continue;
            }
            if recursive && entry.is_dir() {
                stack.push((entry, depth + 1));
            }
        }
    }

    items.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    (items, scanned)
}
