// tests/workspace.rs

use std::fs;
use std::path::PathBuf;

use ij::config::FileList;
use ij::workspace::{FilePatterns, collect_matching, copy_matching};
use tempfile::TempDir;

fn list(files: &[&str], exclude: &[&str]) -> FileList {
    FileList {
        files: files.iter().map(|f| f.to_string()).collect(),
        exclude: exclude.iter().map(|f| f.to_string()).collect(),
    }
}

fn touch(root: &std::path::Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, rel).unwrap();
}

#[test]
fn patterns_honour_excludes() {
    let patterns = FilePatterns::new(&list(&["src/**/*.rs"], &["**/generated/**"])).unwrap();

    assert!(patterns.matches("src/lib.rs"));
    assert!(patterns.matches("src/engine/plan.rs"));
    assert!(!patterns.matches("src/generated/out.rs"));
    assert!(!patterns.matches("README.md"));
}

#[test]
fn invalid_glob_is_an_error() {
    assert!(FilePatterns::new(&list(&["src/[broken"], &[])).is_err());
}

#[test]
fn collect_skips_scratch_root_and_sorts() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "b.txt");
    touch(dir.path(), "a/c.txt");
    touch(dir.path(), ".ij/run/workspace/d.txt");

    let patterns = FilePatterns::new(&list(&["**/*.txt"], &[])).unwrap();
    let files = collect_matching(dir.path(), &patterns).unwrap();

    assert_eq!(files, vec![PathBuf::from("a/c.txt"), PathBuf::from("b.txt")]);
}

#[test]
fn copy_preserves_relative_layout() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    touch(src.path(), "deep/nested/file.cfg");
    touch(src.path(), "skip.log");

    let copied = copy_matching(src.path(), dst.path(), &list(&["**/*.cfg"], &[])).unwrap();

    assert_eq!(copied, vec![PathBuf::from("deep/nested/file.cfg")]);
    assert_eq!(
        fs::read_to_string(dst.path().join("deep/nested/file.cfg")).unwrap(),
        "deep/nested/file.cfg"
    );
    assert!(!dst.path().join("skip.log").exists());
}

#[test]
fn empty_list_copies_nothing() {
    let src = TempDir::new().unwrap();
    touch(src.path(), "file.txt");

    let copied = copy_matching(src.path(), src.path().join("missing").as_path(), &FileList::default())
        .unwrap();
    assert!(copied.is_empty());
}
