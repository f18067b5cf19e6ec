// src/workspace.rs

//! Copying files between the project and the run workspace.
//!
//! `import` copies matching project files into the workspace before any plan
//! runs; `export` copies matching workspace files back after a successful
//! run. Patterns are globs relative to the copy source.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::model::FileList;
use crate::engine::scratch::SCRATCH_ROOT;

/// Compiled include/exclude patterns of a [`FileList`].
pub struct FilePatterns {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for FilePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePatterns")
            .field("include", &self.include.len())
            .finish_non_exhaustive()
    }
}

impl FilePatterns {
    pub fn new(list: &FileList) -> Result<Self> {
        let include = build_globset(&list.files).context("building include globset")?;
        let exclude = if list.exclude.is_empty() {
            None
        } else {
            Some(build_globset(&list.exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    /// Whether a path relative to the copy source (forward slashes) is
    /// selected.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Relative paths of every file under `root` selected by `patterns`.
///
/// The scratch root is never descended into. Results are sorted.
pub fn collect_matching(root: &Path, patterns: &FilePatterns) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if path == root.join(SCRATCH_ROOT) {
                    continue;
                }
                stack.push(path);
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if patterns.matches(&rel_str) {
                        files.push(rel.to_path_buf());
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Copy every file under `src` selected by `list` to the same relative
/// location under `dst`. Returns the copied relative paths.
pub fn copy_matching(src: &Path, dst: &Path, list: &FileList) -> Result<Vec<PathBuf>> {
    if list.is_empty() {
        return Ok(Vec::new());
    }

    let patterns = FilePatterns::new(list)?;
    let files = collect_matching(src, &patterns)?;

    for rel in &files {
        let from = src.join(rel);
        let to = dst.join(rel);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(&from, &to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        debug!(file = %rel.display(), "copied");
    }
    Ok(files)
}
