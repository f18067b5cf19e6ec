// src/engine/scratch.rs

//! Per-run scratch directories.
//!
//! Layout: `<project>/.ij/<run_id>/{workspace,scripts,logs}`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::OutputFiles;
use crate::logging::Prefix;

/// Name of the shared scratch root inside the project directory.
pub const SCRATCH_ROOT: &str = ".ij";

#[derive(Debug, Clone)]
pub struct ScratchSpace {
    project_dir: PathBuf,
    run_id: String,
    keep_workspace: bool,
}

impl ScratchSpace {
    pub fn new(project_dir: impl Into<PathBuf>, run_id: impl Into<String>, keep_workspace: bool) -> Self {
        Self {
            project_dir: project_dir.into(),
            run_id: run_id.into(),
            keep_workspace,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn root(&self) -> PathBuf {
        self.project_dir.join(SCRATCH_ROOT)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root().join(&self.run_id)
    }

    pub fn workspace(&self) -> PathBuf {
        self.run_dir().join("workspace")
    }

    pub fn scripts(&self) -> PathBuf {
        self.run_dir().join("scripts")
    }

    pub fn logs(&self) -> PathBuf {
        self.run_dir().join("logs")
    }

    pub fn setup(&self) -> Result<()> {
        for dir in [self.workspace(), self.scripts(), self.logs()] {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        debug!(run_dir = %self.run_dir().display(), "created scratch space");
        Ok(())
    }

    /// Log files for the task running under `prefix`.
    pub fn log_files(&self, prefix: &Prefix) -> OutputFiles {
        let stem = prefix.file_stem();
        OutputFiles {
            stdout: Some(self.logs().join(format!("{stem}.out.log"))),
            stderr: Some(self.logs().join(format!("{stem}.err.log"))),
        }
    }

    /// Write a task script and return its host path.
    pub fn write_script(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.scripts().join(name);
        fs::write(&path, contents).with_context(|| format!("writing script {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("marking script {} executable", path.display()))?;
        }

        Ok(path)
    }

    /// Discard the workspace and scripts unless retention was requested, and
    /// drop empty stderr logs.
    pub fn prune(&self) -> Result<()> {
        if !self.keep_workspace {
            for dir in [self.workspace(), self.scripts()] {
                if dir.exists() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("removing {}", dir.display()))?;
                }
            }
        }

        let logs = self.logs();
        if !logs.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&logs)? {
            let path = entry?.path();
            let is_err_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".err.log"));
            if is_err_log && fs::metadata(&path)?.len() == 0 {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Remove the run directory, and the scratch root if nothing else is left.
    pub fn teardown(&self) -> Result<()> {
        let run_dir = self.run_dir();
        if run_dir.exists() {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("removing {}", run_dir.display()))?;
        }

        let root = self.root();
        if root.exists() && fs::read_dir(&root)?.next().is_none() {
            fs::remove_dir(&root)?;
        }
        Ok(())
    }
}

/// Remove the whole scratch root of a project.
pub fn clean(project_dir: &Path) -> Result<()> {
    let root = project_dir.join(SCRATCH_ROOT);
    if root.exists() {
        fs::remove_dir_all(&root).with_context(|| format!("removing {}", root.display()))?;
        info!(path = %root.display(), "removed scratch directory");
    }
    Ok(())
}

/// Delete all but the `keep` most recent run directories. Returns the
/// removed paths.
pub fn rotate_logs(project_dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let root = project_dir.join(SCRATCH_ROOT);
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut runs: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let modified = entry.metadata()?.modified()?;
            runs.push((modified, entry.path()));
        }
    }

    // Newest first; ties broken by name for a stable order.
    runs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = Vec::new();
    for (_, path) in runs.into_iter().skip(keep) {
        fs::remove_dir_all(&path).with_context(|| format!("removing {}", path.display()))?;
        debug!(path = %path.display(), "rotated run directory");
        removed.push(path);
    }
    Ok(removed)
}
