// src/config/loader.rs

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{Config, RawConfig};
use crate::errors::{IjError, Result};

/// Load a single configuration file without following `extends`.
///
/// The format is chosen by extension: `.toml` is TOML, anything else is
/// parsed as YAML. This only performs deserialization; it does **not**
/// resolve task extends or check references. Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents)?,
        _ => serde_yaml::from_str(&contents)?,
    };
    config.populate_names();

    Ok(config)
}

/// Load a configuration file and every file it (transitively) extends,
/// merging children on top of their parents.
pub fn load_chain(path: impl AsRef<Path>) -> Result<RawConfig> {
    let mut visited = HashSet::new();
    load_chain_inner(path.as_ref(), &mut visited)
}

fn load_chain_inner(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<RawConfig> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Err(IjError::CyclicConfigExtends(path.display().to_string()));
    }

    let child = load_from_path(&canonical)?;
    let Some(parent_ref) = child.extends.clone().filter(|p| !p.is_empty()) else {
        return Ok(child);
    };

    let parent_path = resolve_relative(&canonical, &parent_ref);
    debug!(
        config = %canonical.display(),
        parent = %parent_path.display(),
        "loading parent config"
    );

    let mut parent = load_chain_inner(&parent_path, visited)?;
    parent.merge(child)?;
    Ok(parent)
}

fn resolve_relative(config_path: &Path, reference: &str) -> PathBuf {
    let reference = Path::new(reference);
    if reference.is_absolute() {
        return reference.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(reference),
        None => reference.to_path_buf(),
    }
}

/// Load a configuration file, apply override files and validate.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML / YAML, following `extends` between files.
/// - Merges each override file (and its own extends chain) on top.
/// - Resolves task `extends`.
/// - Checks stage task references, plan/metaplan names, metaplan cycles.
pub fn load_and_validate(path: impl AsRef<Path>, overrides: &[PathBuf]) -> Result<Config> {
    let mut raw = load_chain(&path)?;
    for override_path in overrides {
        let child = load_chain(override_path)?;
        raw.merge(child)?;
    }
    Config::try_from(raw)
}

/// Default config path: `ij.yaml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("ij.yaml")
}
