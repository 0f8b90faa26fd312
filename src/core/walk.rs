//! Filepath: src/core/walk.rs
//! Local file walker: expands CLI file/glob/directory patterns into a
//! deduplicated list of files under the local base path.
//!
//! Expansion order per pattern:
//!   1) recursive file-name search from the start directory (only when
//!      recursion is on and the pattern has no separator)
//!   2) standard glob expansion (`**` supported)
//!   3) the literal path itself, when it names an existing entry
//! Anything else produces a non-fatal warning.
//!
//! Matches outside the base are silently dropped; excluded matches are
//! dropped; matched directories descend through the directory walk, which
//! honors per-directory ignore files and prunes excluded subtrees.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder};
use tracing::debug;

use crate::core::excludes::{dir_ignore_patterns, ExcludeSet, IGNORE_FILE_NAME};

/// Outcome of a pattern expansion: resolved files plus any per-pattern
/// warnings for the caller to display.
#[derive(Debug, Default)]
pub struct ExpandResult {
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Expand `patterns` into files under `local_base`. `start_dir` is the
/// directory relative patterns and recursive searches resolve against.
pub fn expand_patterns<S: AsRef<str>>(
    patterns: &[S],
    excludes: &ExcludeSet,
    local_base: &Path,
    start_dir: &Path,
    recursive: bool,
) -> ExpandResult {
    let mut result = ExpandResult::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let canon_base =
        dunce::canonicalize(local_base).unwrap_or_else(|_| local_base.to_path_buf());

    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched: Vec<PathBuf> = Vec::new();

        if recursive && !pattern.contains('/') && !pattern.contains('\\') {
            matched = recursive_name_search(start_dir, pattern);
        }

        if matched.is_empty() {
            matched = glob_expand(pattern, start_dir);
        }

        if matched.is_empty() {
            let literal = resolve_input_path(pattern, start_dir);
            if literal.exists() {
                matched.push(literal);
            } else {
                result
                    .warnings
                    .push(format!("No files found for pattern '{pattern}'"));
                continue;
            }
        }

        for m in matched {
            let path = dunce::canonicalize(&m).unwrap_or(m);
            if seen.contains(&path) {
                continue;
            }
            if path.strip_prefix(&canon_base).is_err() {
                debug!(path = %path.display(), "match outside local base, dropped");
                continue;
            }
            if excludes.is_excluded(&path, &canon_base) {
                continue;
            }

            if path.is_file() {
                seen.insert(path.clone());
                result.files.push(path);
            } else if path.is_dir() {
                for file in walk_directory(&path, excludes, &canon_base) {
                    if seen.insert(file.clone()) {
                        result.files.push(file);
                    }
                }
            }
        }
    }

    result
}

/// Recursively collect non-excluded files under `dir`. The caller's
/// exclude set is merged with every ignore file on the chain from `dir`
/// up to `base`, and each subdirectory's own ignore file extends the set
/// for its subtree. Excluded directories are pruned outright.
pub fn walk_directory(dir: &Path, excludes: &ExcludeSet, base: &Path) -> Vec<PathBuf> {
    // Ancestors' ignore files apply to the whole walk; deeper ones are
    // picked up as the walk descends.
    let chain = crate::core::excludes::collect_ignore_patterns(dir, base);
    let combined = excludes.extended(&chain);

    let mut out = Vec::new();
    walk_inner(dir, &combined, base, &mut out);
    out
}

fn walk_inner(dir: &Path, excludes: &ExcludeSet, base: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "unreadable directory, skipped");
        return;
    };
    let mut entries: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();

    for entry in entries {
        if excludes.is_excluded(&entry, base) {
            continue;
        }
        if entry.is_file() {
            out.push(entry);
        } else if entry.is_dir() {
            let extra = dir_ignore_patterns(&entry, base);
            if extra.is_empty() {
                walk_inner(&entry, excludes, base, out);
            } else {
                let extended = excludes.extended(&extra);
                walk_inner(&entry, &extended, base, out);
            }
        }
    }
}

/// Search for plain files whose bare name matches `pattern`, anywhere
/// under `start_dir`. Directory symlinks are not followed.
fn recursive_name_search(start_dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let Ok(glob) = Glob::new(pattern) else {
        return Vec::new();
    };
    let matcher = glob.compile_matcher();

    let mut out = Vec::new();
    let mut stack = vec![start_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                if let Some(name) = path.file_name() {
                    if matcher.is_match(name) {
                        out.push(path);
                    }
                }
            }
        }
    }
    out.sort();
    out
}

/// Standard glob expansion of `pattern` against `start_dir`. Returns both
/// files and directories; a pattern without glob metacharacters resolves
/// to the literal path when it exists.
fn glob_expand(pattern: &str, start_dir: &Path) -> Vec<PathBuf> {
    if !has_glob_meta(pattern) {
        let path = resolve_input_path(pattern, start_dir);
        return if path.exists() { vec![path] } else { Vec::new() };
    }

    let norm = pattern.replace('\\', "/");
    let absolute = Path::new(&norm).is_absolute();
    let mut root = if absolute {
        PathBuf::from("/")
    } else {
        start_dir.to_path_buf()
    };

    // Peel literal leading components onto the walk root; the rest is the
    // glob to match below it.
    let mut rest: Vec<&str> = Vec::new();
    for comp in norm.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if rest.is_empty() && !has_glob_meta(comp) {
            root.push(comp);
        } else {
            rest.push(comp);
        }
    }

    if rest.is_empty() {
        return if root.exists() { vec![root] } else { Vec::new() };
    }
    if !root.is_dir() {
        return Vec::new();
    }

    let rest_glob = rest.join("/");
    let Ok(glob) = GlobBuilder::new(&rest_glob).literal_separator(true).build() else {
        return Vec::new();
    };
    let matcher = glob.compile_matcher();

    // Without `**` the match depth is bounded by the component count.
    let max_depth = if rest_glob.contains("**") {
        usize::MAX
    } else {
        rest.len()
    };

    let mut out = Vec::new();
    let mut stack: Vec<(PathBuf, usize)> = vec![(root.clone(), 0)];
    while let Some((dir, depth)) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if let Ok(rel) = path.strip_prefix(&root) {
                if matcher.is_match(rel) {
                    out.push(path.clone());
                }
            }
            if path.is_dir() && depth + 1 < max_depth {
                stack.push((path, depth + 1));
            }
        }
    }
    out.sort();
    out
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn resolve_input_path(pattern: &str, start_dir: &Path) -> PathBuf {
    let path = Path::new(pattern);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        start_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::core::excludes::relative_slash_path;

    fn write_file(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn walked_files_round_trip_to_slash_paths() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "a/b/c.txt");

        let files = walk_directory(base, &ExcludeSet::default(), base);
        assert_eq!(files.len(), 1);
        assert_eq!(
            relative_slash_path(&files[0], base).as_deref(),
            Some("a/b/c.txt")
        );
    }

    #[test]
    fn glob_expansion_matches_in_start_dir() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "style.css");
        write_file(base, "app.js");

        let result = expand_patterns(
            &["*.css"],
            &ExcludeSet::default(),
            base,
            base,
            false,
        );
        assert!(result.warnings.is_empty());
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("style.css"));
    }

    #[test]
    fn recursive_search_finds_nested_names() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "deep/nested/style.css");
        write_file(base, "top.css");

        let result =
            expand_patterns(&["*.css"], &ExcludeSet::default(), base, base, true);
        assert_eq!(result.files.len(), 2);
    }

    #[test]
    fn double_star_glob_crosses_directories() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "src/app/main.js");
        write_file(base, "src/readme.md");

        let result = expand_patterns(
            &["src/**/*.js"],
            &ExcludeSet::default(),
            base,
            base,
            false,
        );
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("main.js"));
    }

    #[test]
    fn directory_argument_descends_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "assets/logo.png");
        write_file(base, "assets/cache/tmp.bin");

        let excludes = ExcludeSet::new(&["cache/"]);
        let result = expand_patterns(&["assets"], &excludes, base, base, false);
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("logo.png"));
    }

    #[test]
    fn subdirectory_ignore_file_applies_during_walk() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "sub/keep.txt");
        write_file(base, "sub/drop.bak");
        fs::write(base.join("sub").join(IGNORE_FILE_NAME), "*.bak\n").unwrap();

        let files = walk_directory(base, &ExcludeSet::default(), base);
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| relative_slash_path(f, base))
            .filter(|r| !r.ends_with(IGNORE_FILE_NAME))
            .collect();
        assert_eq!(names, vec!["sub/keep.txt"]);
    }

    #[test]
    fn matches_outside_base_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base");
        fs::create_dir_all(&base).unwrap();
        write_file(tmp.path(), "outside.txt");
        write_file(&base, "inside.txt");

        let result = expand_patterns(
            &["outside.txt", "inside.txt"],
            &ExcludeSet::default(),
            &base,
            &base,
            false,
        );
        // outside.txt does not exist under base, so it warns; the literal
        // at the workspace root never enters the result.
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("inside.txt"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn absolute_match_outside_base_is_silently_dropped() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base");
        fs::create_dir_all(&base).unwrap();
        write_file(tmp.path(), "outside.txt");

        let outside = tmp.path().join("outside.txt");
        let result = expand_patterns(
            &[outside.to_string_lossy().as_ref()],
            &ExcludeSet::default(),
            &base,
            &base,
            false,
        );
        assert!(result.files.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn duplicate_matches_are_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "style.css");

        let result = expand_patterns(
            &["*.css", "style.css"],
            &ExcludeSet::default(),
            base,
            base,
            false,
        );
        assert_eq!(result.files.len(), 1);
    }

    #[test]
    fn missing_pattern_warns_and_continues() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path();
        write_file(base, "real.txt");

        let result = expand_patterns(
            &["nope-*.xyz", "real.txt"],
            &ExcludeSet::default(),
            base,
            base,
            false,
        );
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.files.len(), 1);
    }
}
