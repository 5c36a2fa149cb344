// src/environment/prefix.rs

//! Live installation prefixes
//!
//! A prefix records each installed package as
//! `conda-meta/<name>-<version>-<build>.json`, listing every file the
//! package placed in the prefix. Records are read fresh on every call.

use crate::environment::matchspec;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory holding per-package install manifests
pub const META_DIR: &str = "conda-meta";

/// One package's install manifest
#[derive(Debug, Clone, Deserialize)]
pub struct InstallRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    /// Paths relative to the prefix root
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(skip)]
    pub manifest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Prefix {
    root: PathBuf,
}

impl Prefix {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::EnvironmentNotFound(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Install manifests whose file name says they belong to `name`
    fn manifests_named(&self, name: Option<&str>) -> Result<Vec<PathBuf>> {
        let meta = self.meta_dir();
        if !meta.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&meta)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let matches = match (name, matchspec::split_archive_name(stem)) {
                (None, _) => true,
                (Some(wanted), Some((found, _, _))) => found == wanted,
                (Some(_), None) => false,
            };
            if matches {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn read_record(path: &Path) -> Result<InstallRecord> {
        let contents = std::fs::read_to_string(path)?;
        let mut record: InstallRecord = serde_json::from_str(&contents)?;
        record.manifest = path.to_path_buf();
        Ok(record)
    }

    /// Every installed package
    pub fn records(&self) -> Result<Vec<InstallRecord>> {
        self.manifests_named(None)?
            .iter()
            .map(|path| Self::read_record(path))
            .collect()
    }

    /// Install record for `name`, if that package is installed
    pub fn find(&self, name: &str) -> Result<Option<InstallRecord>> {
        for path in self.manifests_named(Some(name))? {
            let record = Self::read_record(&path)?;
            if record.name == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }

    /// Delete every file a record registers, then the record itself
    ///
    /// Returns the number of package files removed. Files already gone
    /// are skipped, as are entries that would resolve outside the prefix.
    pub fn uninstall(&self, record: &InstallRecord) -> Result<usize> {
        let mut removed = 0;
        for file in &record.files {
            if !is_inside_prefix(file) {
                warn!(
                    "Skipping {} listed by {}: not a path inside the prefix",
                    file,
                    record.manifest.display()
                );
                continue;
            }
            let path = self.root.join(file);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Already gone: {}", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        std::fs::remove_file(&record.manifest)?;
        info!(
            "Removed {}-{}-{} ({} files) from {}",
            record.name,
            record.version,
            record.build,
            removed,
            self.root.display()
        );
        Ok(removed)
    }

    /// Remove a previous install of `name`; a missing install is only logged
    pub fn ensure_not_installed(&self, name: &str) -> Result<usize> {
        match self.find(name)? {
            Some(record) => self.uninstall(&record),
            None => {
                warn!(
                    "No install manifest for {} in {}; nothing to clean up",
                    name,
                    self.root.display()
                );
                Ok(0)
            }
        }
    }
}

/// Resolve an environment given as a path or as a name under `envs_dirs`
/// Relative path made only of normal components
fn is_inside_prefix(file: &str) -> bool {
    let path = Path::new(file);
    !file.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn find_environment(value: &str, envs_dirs: &[PathBuf]) -> Result<PathBuf> {
    let direct = Path::new(value);
    if direct.is_dir() {
        return Ok(std::path::absolute(direct)?);
    }
    envs_dirs
        .iter()
        .map(|dir| dir.join(value))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| Error::EnvironmentNotFound(value.to_string()))
}
