//! Library-level pipeline tests: pattern expansion through tree diff and
//! upload ordering, on real fixture trees.

use std::collections::BTreeSet;
use std::path::Path;

use assert_fs::prelude::*;

use skiff::core::excludes::{relative_slash_path, ExcludeSet, IGNORE_FILE_NAME};
use skiff::core::tree::{TreeDiff, TreeNode};
use skiff::core::upload::sort_for_upload;
use skiff::core::walk::expand_patterns;

fn rel_set(files: &[std::path::PathBuf], base: &Path) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|f| relative_slash_path(f, base))
        .collect()
}

#[test]
fn expansion_diff_and_render_work_together() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("index.html").write_str("<html/>").unwrap();
    tmp.child("style.css").write_str("body{}").unwrap();
    tmp.child("src/app.js").write_str("let x;").unwrap();
    tmp.child("src/app.js.bak").write_str("old").unwrap();
    tmp.child("node_modules/pkg/index.js").write_str("x").unwrap();

    let excludes = ExcludeSet::new(&["node_modules/", "*.bak"]);
    let result = expand_patterns(
        &["index.html", "style.css", "src"],
        &excludes,
        tmp.path(),
        tmp.path(),
        false,
    );
    assert!(result.warnings.is_empty());

    let local = rel_set(&result.files, tmp.path());
    let expected: BTreeSet<String> = ["index.html", "style.css", "src/app.js"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(local, expected);

    let remote: BTreeSet<String> =
        ["style.css", "old.js"].iter().map(|s| s.to_string()).collect();
    let diff = TreeDiff::compute(&local, &remote, true);
    assert_eq!(diff.new.len(), 2);
    assert_eq!(diff.overwrite.len(), 1);
    assert_eq!(diff.remote_only.len(), 1);

    let tree = TreeNode::from_diff(&diff);
    let mut lines = Vec::new();
    let hidden = tree.render(20, false, &mut lines);
    assert_eq!(hidden, 0);

    // Directories come first, then files sorted by name, tagged by status.
    assert_eq!(
        lines,
        vec![
            "├── src/",
            "│   └── app.js [NEW]",
            "├── index.html [NEW]",
            "├── old.js [REMOTE ONLY]",
            "└── style.css [OVERWRITE]",
        ]
    );
}

#[test]
fn ignore_files_shape_the_expansion() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("keep.txt").write_str("k").unwrap();
    tmp.child("logs/run.log").write_str("l").unwrap();
    tmp.child("docs/draft.txt").write_str("d").unwrap();
    tmp.child("docs/final.txt").write_str("f").unwrap();
    tmp.child(IGNORE_FILE_NAME).write_str("logs/\n").unwrap();
    tmp.child(&format!("docs/{IGNORE_FILE_NAME}"))
        .write_str("draft.txt\n")
        .unwrap();

    let result = expand_patterns(
        &["."],
        &ExcludeSet::default(),
        tmp.path(),
        tmp.path(),
        false,
    );
    let mut local: Vec<String> = rel_set(&result.files, tmp.path())
        .into_iter()
        .filter(|r| !r.ends_with(IGNORE_FILE_NAME))
        .collect();
    local.sort();
    assert_eq!(local, vec!["docs/final.txt", "keep.txt"]);
}

#[test]
fn upload_order_is_depth_then_name() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("deep/er/file.txt").write_str("x").unwrap();
    tmp.child("Upper.txt").write_str("x").unwrap();
    tmp.child("alpha.txt").write_str("x").unwrap();
    tmp.child("mid/beta.txt").write_str("x").unwrap();

    let result = expand_patterns(
        &["."],
        &ExcludeSet::default(),
        tmp.path(),
        tmp.path(),
        false,
    );
    let sorted = sort_for_upload(result.files, tmp.path());
    let rels: Vec<String> = sorted
        .iter()
        .filter_map(|f| relative_slash_path(f, tmp.path()))
        .collect();
    assert_eq!(
        rels,
        vec!["alpha.txt", "Upper.txt", "mid/beta.txt", "deep/er/file.txt"]
    );
}
