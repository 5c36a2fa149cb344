// src/environment/mod.rs

//! Environment specification sources
//!
//! A runtime environment can be described four ways: a list of package
//! specifiers, an environment manifest, an explicit lock file, or an
//! already-materialized prefix. Each has its own submodule; `SpecSource`
//! holds whichever one a descriptor was built from.

pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod matchspec;
pub mod prefix;

pub use installer::{Conda, PackageManager};
pub use lockfile::is_lock_file;
pub use manifest::EnvironmentManifest;
pub use prefix::Prefix;

use crate::error::Result;
use std::path::{Path, PathBuf};

/// The single active description of a target runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    /// Package specifiers, possibly pinned URLs
    ExplicitPackages(Vec<String>),
    /// Working copy of an environment manifest
    ManifestFile(PathBuf),
    /// Working copy of an explicit lock file
    LockFile(PathBuf),
    /// Materialized installation prefix
    LiveEnvironment(PathBuf),
}

impl SpecSource {
    /// Classify a spec file by content: lock file if it carries the marker
    pub fn detect(path: &Path) -> Result<Self> {
        if lockfile::is_lock_file_at(path)? {
            Ok(Self::LockFile(path.to_path_buf()))
        } else {
            Ok(Self::ManifestFile(path.to_path_buf()))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExplicitPackages(_) => "dependencies",
            Self::ManifestFile(_) => "environment_yaml",
            Self::LockFile(_) => "explicit_lock",
            Self::LiveEnvironment(_) => "environment",
        }
    }

    /// File handed to the installer generator, for manifest and lock sources
    pub fn environment_file(&self) -> Option<&Path> {
        match self {
            Self::ManifestFile(path) | Self::LockFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn explicit_packages(&self) -> Option<&[String]> {
        match self {
            Self::ExplicitPackages(specs) => Some(specs),
            _ => None,
        }
    }

    pub fn live_environment(&self) -> Option<&Path> {
        match self {
            Self::LiveEnvironment(path) => Some(path),
            _ => None,
        }
    }
}
