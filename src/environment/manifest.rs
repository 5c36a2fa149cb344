// src/environment/manifest.rs

//! Environment manifests (`environment.yml`)
//!
//! Only `channels` and `dependencies` are interpreted. All other keys are
//! carried through rewrites untouched.

use crate::environment::matchspec;
use crate::error::{Error, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EnvironmentManifest {
    path: PathBuf,
    document: Mapping,
}

impl EnvironmentManifest {
    /// Load and check the structure of a manifest
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let invalid = |reason: &str| Error::InvalidManifest {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let document = match serde_yaml::from_str::<Value>(&contents)? {
            Value::Mapping(mapping) => mapping,
            _ => return Err(invalid("expected a mapping at the top level")),
        };
        for key in ["dependencies", "channels"] {
            match document.get(key) {
                None | Some(Value::Sequence(_)) | Some(Value::Null) => {}
                Some(_) => return Err(invalid(&format!("'{}' must be a list", key))),
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn strings(&self, key: &str) -> Vec<String> {
        match self.document.get(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Conda dependency specifiers (nested `pip:` sections are skipped)
    pub fn dependencies(&self) -> Vec<String> {
        self.strings("dependencies")
    }

    pub fn channels(&self) -> Vec<String> {
        self.strings("channels")
    }

    fn push(&mut self, key: &str, value: Value, front: bool) {
        let slot = self
            .document
            .entry(Value::String(key.to_string()))
            .or_insert(Value::Null);
        if !slot.is_sequence() {
            *slot = Value::Sequence(Vec::new());
        }
        if let Value::Sequence(items) = slot {
            if front {
                items.insert(0, value);
            } else {
                items.push(value);
            }
        }
    }

    /// Append `spec` unless a dependency on the same package is listed
    pub fn add_dependency(&mut self, spec: &str) -> bool {
        let name = matchspec::package_name(spec);
        let listed = self
            .dependencies()
            .iter()
            .any(|dep| dep == spec || (name.is_some() && matchspec::package_name(dep) == name));
        if listed {
            debug!("{} already listed in {}", spec, self.path.display());
            return false;
        }
        self.push("dependencies", Value::String(spec.to_string()), false);
        true
    }

    /// Prepend `channel` unless it is already listed
    pub fn add_channel(&mut self, channel: &str) -> bool {
        if self.channels().iter().any(|c| c == channel) {
            return false;
        }
        self.push("channels", Value::String(channel.to_string()), true);
        true
    }

    /// Rewrite the manifest in place
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.document)?;
        std::fs::write(&self.path, yaml)?;
        info!("Rewrote {}", self.path.display());
        Ok(())
    }
}

/// Specifier to record in a manifest for an injected package
pub fn dependency_spec(package: &str, version: Option<&str>, build: Option<&str>) -> String {
    match (version, build) {
        (Some(version), Some(build)) => format!("{}={}={}", package, version, build),
        (Some(version), None) => format!("{}={}", package, version),
        (None, Some(build)) => format!("{}=*={}", package, build),
        (None, None) => package.to_string(),
    }
}
